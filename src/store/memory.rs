use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use crate::auth::{hash_token, RefreshToken};
use crate::error::{AppError, StoreError};
use crate::store::RefreshTokenStore;

type Records = HashMap<Uuid, RefreshToken>;

/// Mutex-guarded map of refresh token records, keyed by id
#[derive(Default)]
pub struct InMemoryRefreshTokenStore {
    records: Mutex<Records>,
}

impl InMemoryRefreshTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records, revoked ones included
    pub fn len(&self) -> usize {
        // A panic elsewhere does not change how many records are stored
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Records>, AppError> {
        self.records
            .lock()
            .map_err(|_| AppError::Store(StoreError::Connection("store lock poisoned".to_string())))
    }
}

fn check_unique(records: &Records, record: &RefreshToken) -> Result<(), AppError> {
    if records.contains_key(&record.id) {
        return Err(StoreError::Conflict("refresh token id".to_string()).into());
    }
    if records.values().any(|r| r.token_hash == record.token_hash) {
        return Err(StoreError::Conflict("refresh token".to_string()).into());
    }
    Ok(())
}

fn revoke_active(records: &mut Records, id: Uuid) -> bool {
    match records.get_mut(&id) {
        Some(record) if !record.is_revoked => {
            record.is_revoked = true;
            true
        }
        _ => false,
    }
}

#[async_trait]
impl RefreshTokenStore for InMemoryRefreshTokenStore {
    async fn create(&self, record: &RefreshToken) -> Result<Uuid, AppError> {
        let mut records = self.lock()?;
        check_unique(&records, record)?;
        records.insert(record.id, record.clone());
        Ok(record.id)
    }

    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshToken>, AppError> {
        let token_hash = hash_token(token);
        let records = self.lock()?;
        Ok(records.values().find(|r| r.token_hash == token_hash).cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<RefreshToken>, AppError> {
        let records = self.lock()?;
        Ok(records.get(&id).cloned())
    }

    async fn revoke(&self, id: Uuid) -> Result<(), AppError> {
        let mut records = self.lock()?;
        if let Some(record) = records.get_mut(&id) {
            record.is_revoked = true;
        }
        Ok(())
    }

    async fn revoke_if_active(&self, id: Uuid) -> Result<bool, AppError> {
        let mut records = self.lock()?;
        Ok(revoke_active(&mut records, id))
    }

    async fn replace(&self, stale_id: Uuid, record: &RefreshToken) -> Result<bool, AppError> {
        let mut records = self.lock()?;
        // Both checks run before either write
        check_unique(&records, record)?;
        if !revoke_active(&mut records, stale_id) {
            return Ok(false);
        }
        records.insert(record.id, record.clone());
        Ok(true)
    }
}
