use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::identity::{IdentityProvider, User};

/// Read-only view of the identity service's `users` and `user_roles` tables
#[derive(Clone)]
pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityProvider for PgIdentityStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT id, username, email FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, username, email)| User { id, username, email }))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query_as::<_, (Uuid, String, String)>(
            "SELECT id, username, email FROM users WHERE lower(email) = lower($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|(id, username, email)| User { id, username, email }))
    }

    async fn check_password(&self, user: &User, password: &str) -> Result<bool, AppError> {
        let password_hash = sqlx::query_scalar::<_, String>(
            "SELECT password_hash FROM users WHERE id = $1",
        )
        .bind(user.id)
        .fetch_optional(&self.pool)
        .await?;

        match password_hash {
            Some(hash) => Ok(bcrypt::verify(password, &hash)?),
            None => Ok(false),
        }
    }

    async fn get_roles(&self, user: &User) -> Result<Vec<String>, AppError> {
        let roles = sqlx::query_scalar::<_, String>(
            "SELECT role FROM user_roles WHERE user_id = $1 ORDER BY role",
        )
        .bind(user.id)
        .fetch_all(&self.pool)
        .await?;

        Ok(roles)
    }
}
