/// Token Pair Issuance
///
/// The login path: checks credentials with the identity service, signs a
/// short-lived access token carrying the user's current roles and persists
/// a long-lived refresh token next to it.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::claims::TokenSubject;
use crate::auth::refresh_token::RefreshToken;
use crate::auth::signer::{SignedToken, Signer};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError, ConfigError};
use crate::identity::{IdentityProvider, User};
use crate::store::RefreshTokenStore;

/// Token pair returned by login and refresh
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtResponse {
    pub token: String,
    pub refresh_token: String,
    /// Expiry of the access token
    pub expires_at: DateTime<Utc>,
}

pub struct TokenIssuer {
    signer: Arc<Signer>,
    store: Arc<dyn RefreshTokenStore>,
    identity: Arc<dyn IdentityProvider>,
    access_token_ttl: Duration,
    refresh_token_ttl: Months,
}

impl TokenIssuer {
    /// # Errors
    /// Returns `ConfigError` if the token lifetimes are out of range
    pub fn new(
        config: &JwtSettings,
        signer: Arc<Signer>,
        store: Arc<dyn RefreshTokenStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let access_token_ttl = Duration::try_seconds(config.access_token_expiry).ok_or_else(|| {
            ConfigError::InvalidValue("jwt.access_token_expiry is out of range".to_string())
        })?;

        Ok(Self {
            signer,
            store,
            identity,
            access_token_ttl,
            refresh_token_ttl: Months::new(config.refresh_token_expiry_months),
        })
    }

    /// Check credentials and issue a new pair
    ///
    /// Unknown email and wrong password fail the same way.
    ///
    /// # Errors
    /// - `InvalidCredentials` if the credentials do not match a user
    /// - store and identity failures as they come
    pub async fn login(&self, email: &str, password: &str) -> Result<JwtResponse, AppError> {
        let user = match self.identity.find_user_by_email(email).await? {
            Some(user) => user,
            None => {
                tracing::info!("Login attempt for unknown email");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !self.identity.check_password(&user, password).await? {
            tracing::info!(user_id = %user.id, "Login attempt with wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        self.issue_pair(&user).await
    }

    /// Sign an access token and persist a brand new refresh token for `user`
    pub async fn issue_pair(&self, user: &User) -> Result<JwtResponse, AppError> {
        let (response, record) = self.prepare_pair(user).await?;
        let record_id = self.store.create(&record).await?;

        tracing::info!(
            user_id = %user.id,
            refresh_token_id = %record_id,
            jti = record.jwt_id.as_deref().unwrap_or_default(),
            "Issued new token pair"
        );

        Ok(response)
    }

    /// Issue a new pair in place of the refresh record `stale_id`
    ///
    /// The stale record is revoked and the new one stored in a single store
    /// operation. Returns `None` when `stale_id` had already been revoked.
    pub async fn replace_pair(
        &self,
        user: &User,
        stale_id: Uuid,
    ) -> Result<Option<JwtResponse>, AppError> {
        let (response, record) = self.prepare_pair(user).await?;
        if !self.store.replace(stale_id, &record).await? {
            return Ok(None);
        }

        tracing::info!(
            user_id = %user.id,
            refresh_token_id = %record.id,
            replaced_refresh_token_id = %stale_id,
            "Replaced expired refresh token with a new pair"
        );

        Ok(Some(response))
    }

    /// Sign a new access token that travels with an existing refresh token
    ///
    /// `refresh_token` is the secret the client presented for `record`. The
    /// record is left untouched; its expiry is not extended.
    pub async fn reissue_access_token(
        &self,
        user: &User,
        record: &RefreshToken,
        refresh_token: &str,
    ) -> Result<JwtResponse, AppError> {
        let access = self.sign_access_token(user).await?;

        tracing::info!(
            user_id = %user.id,
            refresh_token_id = %record.id,
            jti = %access.jti,
            "Issued access token for existing refresh token"
        );

        Ok(JwtResponse {
            token: access.token,
            refresh_token: refresh_token.to_string(),
            expires_at: access.expires_at,
        })
    }

    async fn prepare_pair(&self, user: &User) -> Result<(JwtResponse, RefreshToken), AppError> {
        let access = self.sign_access_token(user).await?;

        let refresh_expires_at = Utc::now()
            .checked_add_months(self.refresh_token_ttl)
            .ok_or_else(|| AppError::Internal("Refresh token expiry out of range".to_string()))?;
        let (record, secret) = RefreshToken::issue(user.id, access.jti, refresh_expires_at);

        let response = JwtResponse {
            token: access.token,
            refresh_token: secret,
            expires_at: access.expires_at,
        };
        Ok((response, record))
    }

    async fn sign_access_token(&self, user: &User) -> Result<SignedToken, AppError> {
        let roles = self.identity.get_roles(user).await?;
        let subject = TokenSubject {
            user_id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            roles,
        };
        self.signer.sign(&subject, self.access_token_ttl)
    }
}
