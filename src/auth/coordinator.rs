/// Refresh Token Rotation
///
/// Exchanges an (access token, refresh token) pair for a renewed pair.
/// Each call is one decision over its inputs:
///
/// | access token | refresh record | outcome                              |
/// |--------------|----------------|--------------------------------------|
/// | valid        | active         | new access token, same refresh token |
/// | valid        | expired        | new access token, same refresh token |
/// | expired      | active         | new access token, same refresh token |
/// | expired      | expired        | brand new pair                       |
///
/// A tampered access token, or an unknown, revoked or foreign refresh
/// token, is rejected before the table is consulted.

use chrono::Utc;
use std::sync::Arc;

use crate::auth::claims::Claims;
use crate::auth::issuer::{JwtResponse, TokenIssuer};
use crate::auth::signer::{Signer, TokenError};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};
use crate::identity::IdentityProvider;
use crate::store::RefreshTokenStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTokenState {
    Valid,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshRecordState {
    Active,
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationDecision {
    /// Sign a new access token for the presented refresh record
    ReuseRecord,
    /// Replace the record with a fresh pair, as on login
    IssueNewPair,
}

impl RotationDecision {
    pub fn decide(access: AccessTokenState, refresh: RefreshRecordState) -> Self {
        match (access, refresh) {
            (AccessTokenState::Valid, RefreshRecordState::Active) => RotationDecision::ReuseRecord,
            (AccessTokenState::Valid, RefreshRecordState::Expired) => RotationDecision::ReuseRecord,
            (AccessTokenState::Expired, RefreshRecordState::Active) => RotationDecision::ReuseRecord,
            (AccessTokenState::Expired, RefreshRecordState::Expired) => RotationDecision::IssueNewPair,
        }
    }
}

pub struct RefreshCoordinator {
    issuer: Arc<TokenIssuer>,
    signer: Arc<Signer>,
    store: Arc<dyn RefreshTokenStore>,
    identity: Arc<dyn IdentityProvider>,
    revoke_on_rotation: bool,
}

impl RefreshCoordinator {
    pub fn new(
        config: &JwtSettings,
        issuer: Arc<TokenIssuer>,
        signer: Arc<Signer>,
        store: Arc<dyn RefreshTokenStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Self {
        Self {
            issuer,
            signer,
            store,
            identity,
            revoke_on_rotation: config.revoke_on_rotation,
        }
    }

    /// Rotate a token pair
    ///
    /// # Errors
    /// - `InvalidRefreshToken` if the refresh token is unknown or revoked,
    ///   its user no longer exists, or it belongs to another user than the
    ///   access token
    /// - `InvalidAccessToken` if the access token fails verification for
    ///   any reason other than expiry
    /// - store and identity failures, never retried here
    ///
    /// When an expired record is replaced, revoking it and storing its
    /// successor happen in one store operation; a failed write leaves the
    /// presented refresh token usable.
    pub async fn rotate(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Result<JwtResponse, AppError> {
        let record = match self.store.find_by_token(refresh_token).await? {
            Some(record) => record,
            None => {
                tracing::warn!("Refresh token not found");
                return Err(AuthError::InvalidRefreshToken.into());
            }
        };

        if record.is_revoked {
            tracing::warn!(
                user_id = %record.user_id,
                refresh_token_id = %record.id,
                "Attempt to use revoked refresh token"
            );
            return Err(AuthError::InvalidRefreshToken.into());
        }

        let user = match self.identity.find_user_by_id(record.user_id).await? {
            Some(user) => user,
            None => {
                tracing::warn!(
                    user_id = %record.user_id,
                    refresh_token_id = %record.id,
                    "Refresh token owner no longer exists"
                );
                return Err(AuthError::InvalidRefreshToken.into());
            }
        };

        let (access_state, claims) = self.check_access_token(access_token)?;

        if claims.sub != record.user_id.to_string() {
            tracing::warn!(
                user_id = %record.user_id,
                refresh_token_id = %record.id,
                "Access token subject does not own the refresh token"
            );
            return Err(AuthError::InvalidRefreshToken.into());
        }

        let refresh_state = if record.is_expired_at(Utc::now()) {
            RefreshRecordState::Expired
        } else {
            RefreshRecordState::Active
        };

        let decision = RotationDecision::decide(access_state, refresh_state);
        tracing::info!(
            user_id = %user.id,
            refresh_token_id = %record.id,
            access = ?access_state,
            refresh = ?refresh_state,
            decision = ?decision,
            "Rotating token pair"
        );

        match decision {
            RotationDecision::ReuseRecord => {
                self.issuer
                    .reissue_access_token(&user, &record, refresh_token)
                    .await
            }
            RotationDecision::IssueNewPair if self.revoke_on_rotation => {
                match self.issuer.replace_pair(&user, record.id).await? {
                    Some(response) => Ok(response),
                    None => {
                        // Another request replaced this record first
                        tracing::warn!(
                            user_id = %user.id,
                            refresh_token_id = %record.id,
                            "Refresh token was rotated concurrently"
                        );
                        Err(AuthError::InvalidRefreshToken.into())
                    }
                }
            }
            RotationDecision::IssueNewPair => self.issuer.issue_pair(&user).await,
        }
    }

    fn check_access_token(&self, token: &str) -> Result<(AccessTokenState, Claims), AppError> {
        match self.signer.verify(token) {
            Ok(claims) => Ok((AccessTokenState::Valid, claims)),
            Err(TokenError::Expired(claims)) => Ok((AccessTokenState::Expired, *claims)),
            Err(TokenError::Invalid(reason)) => {
                tracing::warn!(reason = %reason, "Rejected access token during refresh");
                Err(AuthError::InvalidAccessToken.into())
            }
        }
    }
}
