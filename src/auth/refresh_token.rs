/// Refresh Token Records
///
/// Refresh tokens are long-lived opaque secrets. The client holds the
/// secret; the server keeps only its SHA-256 hash. A record is created on
/// login (or when an expired record is replaced during rotation) and
/// afterwards only ever flips to revoked.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Persisted refresh token
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct RefreshToken {
    pub id: Uuid,
    /// SHA-256 of the secret handed to the client, hex encoded
    pub token_hash: String,
    /// `jti` of the access token issued alongside this record
    pub jwt_id: Option<String>,
    pub user_id: Uuid,
    pub is_revoked: bool,
    pub date_added: DateTime<Utc>,
    pub date_expire: DateTime<Utc>,
}

impl RefreshToken {
    /// New, non-revoked record for `secret`
    pub fn new(user_id: Uuid, jwt_id: String, secret: &str, expires_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            token_hash: hash_token(secret),
            jwt_id: Some(jwt_id),
            user_id,
            is_revoked: false,
            date_added: Utc::now(),
            date_expire: expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.date_expire <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// New record with a freshly generated secret
    ///
    /// The secret is returned next to the record and is not stored anywhere.
    pub fn issue(user_id: Uuid, jwt_id: String, expires_at: DateTime<Utc>) -> (Self, String) {
        let secret = generate_refresh_token();
        let record = Self::new(user_id, jwt_id, &secret, expires_at);
        (record, secret)
    }

    /// Whether `secret` is the one this record was created for
    pub fn matches(&self, secret: &str) -> bool {
        self.token_hash == hash_token(secret)
    }

    /// Neither revoked nor expired
    pub fn is_active(&self) -> bool {
        !self.is_revoked && !self.is_expired()
    }
}

/// Generate a new refresh token secret
///
/// Two independent random v4 UUIDs (122 random bits each) in simple form,
/// giving a 64 character hex string.
pub fn generate_refresh_token() -> String {
    format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    )
}

/// Hash a refresh token secret for storage and lookup
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}
