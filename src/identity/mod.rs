/// Identity collaborator
///
/// Users, passwords and role membership belong to an external identity
/// service. Token issuance only needs the narrow lookups below; adapters
/// for Postgres and for in-process use implement them.

mod memory;
mod postgres;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;

pub use memory::{InMemoryIdentityStore, MIN_HASH_COST};
pub use postgres::PgIdentityStore;

/// Role names known to the identity service
pub mod roles {
    pub const ADMIN: &str = "Admin";
    pub const USER: &str = "User";
}

/// A registered user, as seen by the token service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Whether `password` is the user's current password
    async fn check_password(&self, user: &User, password: &str) -> Result<bool, AppError>;

    /// Current role membership; read at every issuance, never cached
    async fn get_roles(&self, user: &User) -> Result<Vec<String>, AppError>;
}
