use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::auth::{hash_token, RefreshToken};
use crate::error::AppError;
use crate::store::RefreshTokenStore;

const INSERT_REFRESH_TOKEN: &str = r#"
    INSERT INTO refresh_tokens (id, token_hash, jwt_id, user_id, is_revoked, date_added, date_expire)
    VALUES ($1, $2, $3, $4, $5, $6, $7)
"#;

// Row-level conditional update: only one concurrent caller sees a hit
const REVOKE_IF_ACTIVE: &str =
    "UPDATE refresh_tokens SET is_revoked = true WHERE id = $1 AND is_revoked = false";

/// Refresh tokens in the `refresh_tokens` table
#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn create(&self, record: &RefreshToken) -> Result<Uuid, AppError> {
        sqlx::query(INSERT_REFRESH_TOKEN)
            .bind(record.id)
            .bind(&record.token_hash)
            .bind(&record.jwt_id)
            .bind(record.user_id)
            .bind(record.is_revoked)
            .bind(record.date_added)
            .bind(record.date_expire)
            .execute(&self.pool)
            .await?;

        Ok(record.id)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        let record = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, token_hash, jwt_id, user_id, is_revoked, date_added, date_expire
            FROM refresh_tokens
            WHERE token_hash = $1
            "#,
        )
        .bind(hash_token(token))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>, AppError> {
        let record = sqlx::query_as::<_, RefreshToken>(
            r#"
            SELECT id, token_hash, jwt_id, user_id, is_revoked, date_added, date_expire
            FROM refresh_tokens
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn revoke(&self, id: Uuid) -> Result<(), AppError> {
        sqlx::query("UPDATE refresh_tokens SET is_revoked = true WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn revoke_if_active(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query(REVOKE_IF_ACTIVE)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn replace(&self, stale_id: Uuid, record: &RefreshToken) -> Result<bool, AppError> {
        let mut transaction = self.pool.begin().await?;

        let revoked = sqlx::query(REVOKE_IF_ACTIVE)
            .bind(stale_id)
            .execute(&mut transaction)
            .await?;
        if revoked.rows_affected() != 1 {
            transaction.rollback().await?;
            return Ok(false);
        }

        // An insert failure drops the transaction, rolling back the revocation
        sqlx::query(INSERT_REFRESH_TOKEN)
            .bind(record.id)
            .bind(&record.token_hash)
            .bind(&record.jwt_id)
            .bind(record.user_id)
            .bind(record.is_revoked)
            .bind(record.date_added)
            .bind(record.date_expire)
            .execute(&mut transaction)
            .await?;

        transaction.commit().await?;
        Ok(true)
    }
}
