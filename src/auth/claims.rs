/// JWT Claims structure
///
/// Payload of an access token: user identity, a role snapshot taken at
/// issuance, and the registered claims (RFC 7519).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, AuthError};

/// Identity facts a signed token is bound to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenSubject {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub roles: Vec<String>,
}

/// JWT Claims for access tokens
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (user ID as UUID string)
    pub sub: String,
    pub username: String,
    pub email: String,
    /// Unique token id
    pub jti: String,
    #[serde(default)]
    pub roles: Vec<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    pub iss: String,
    pub aud: String,
}

impl Claims {
    /// Extract user ID from claims
    ///
    /// # Errors
    /// Returns `InvalidAccessToken` if the subject is not a UUID
    pub fn user_id(&self) -> Result<Uuid, AppError> {
        Uuid::parse_str(&self.sub).map_err(|_| AppError::Auth(AuthError::InvalidAccessToken))
    }

    /// Expired once the current second reaches `exp`
    pub fn is_expired_at(&self, now: i64) -> bool {
        self.exp <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(chrono::Utc::now().timestamp())
    }

    /// The identity part of the claims
    pub fn subject(&self) -> Result<TokenSubject, AppError> {
        Ok(TokenSubject {
            user_id: self.user_id()?,
            username: self.username.clone(),
            email: self.email.clone(),
            roles: self.roles.clone(),
        })
    }
}
