/// Refresh token persistence
///
/// The rotation logic talks to storage only through [`RefreshTokenStore`].
/// Postgres backs production; the in-memory store serves tests and local runs.

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::auth::RefreshToken;
use crate::error::AppError;

pub use memory::InMemoryRefreshTokenStore;
pub use postgres::PgRefreshTokenStore;

#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    /// Persist a new record and return its id
    ///
    /// # Errors
    /// `StoreError::Conflict` if the secret hash is already stored, other
    /// `StoreError`s on persistence failure
    async fn create(&self, record: &RefreshToken) -> Result<Uuid, AppError>;

    /// Look a record up by the plaintext secret the client presented
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>, AppError>;

    /// Mark the record revoked. Revoking twice, or revoking an unknown id,
    /// is not an error.
    async fn revoke(&self, id: Uuid) -> Result<(), AppError>;

    /// Revoke the record only if nobody has revoked it yet
    ///
    /// Returns `true` for the single caller that performed the transition.
    /// Concurrent rotations of the same record use this to make sure only
    /// one of them replaces it.
    async fn revoke_if_active(&self, id: Uuid) -> Result<bool, AppError>;

    /// Revoke `stale_id` and persist `record` as one unit
    ///
    /// Returns `false`, writing nothing, when `stale_id` was already revoked.
    /// If persisting `record` fails the revocation is undone, so the caller
    /// keeps a usable refresh token.
    async fn replace(&self, stale_id: Uuid, record: &RefreshToken) -> Result<bool, AppError>;
}
