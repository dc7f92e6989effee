use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::error::{AppError, AuthError, StoreError};
use crate::identity::{IdentityProvider, User};

/// Cheapest bcrypt cost accepted by the hasher
pub const MIN_HASH_COST: u32 = 4;

struct StoredUser {
    user: User,
    password_hash: String,
    roles: Vec<String>,
}

/// In-process identity directory for tests and local runs
pub struct InMemoryIdentityStore {
    users: Mutex<HashMap<Uuid, StoredUser>>,
    hash_cost: u32,
}

impl Default for InMemoryIdentityStore {
    fn default() -> Self {
        Self::with_hash_cost(bcrypt::DEFAULT_COST)
    }
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a lower bcrypt cost, e.g. `MIN_HASH_COST` in tests
    pub fn with_hash_cost(hash_cost: u32) -> Self {
        Self {
            users: Mutex::new(HashMap::new()),
            hash_cost,
        }
    }

    /// Add a user with the given password and roles
    ///
    /// # Errors
    /// `DuplicateUser` if the email is already taken
    pub fn insert_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
        roles: &[&str],
    ) -> Result<User, AppError> {
        let password_hash = bcrypt::hash(password, self.hash_cost)?;
        let mut users = self.lock()?;

        if users
            .values()
            .any(|stored| stored.user.email.eq_ignore_ascii_case(email))
        {
            return Err(AuthError::DuplicateUser(email.to_string()).into());
        }

        let user = User {
            id: Uuid::new_v4(),
            username: username.to_string(),
            email: email.to_string(),
        };
        users.insert(
            user.id,
            StoredUser {
                user: user.clone(),
                password_hash,
                roles: roles.iter().map(|r| r.to_string()).collect(),
            },
        );
        Ok(user)
    }

    pub fn set_roles(&self, user_id: Uuid, roles: &[&str]) -> Result<(), AppError> {
        let mut users = self.lock()?;
        if let Some(stored) = users.get_mut(&user_id) {
            stored.roles = roles.iter().map(|r| r.to_string()).collect();
        }
        Ok(())
    }

    pub fn remove_user(&self, user_id: Uuid) -> Result<(), AppError> {
        self.lock()?.remove(&user_id);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, StoredUser>>, AppError> {
        self.users.lock().map_err(|_| {
            AppError::Store(StoreError::Connection("identity lock poisoned".to_string()))
        })
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityStore {
    async fn find_user_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.lock()?.get(&id).map(|stored| stored.user.clone()))
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .lock()?
            .values()
            .find(|stored| stored.user.email.eq_ignore_ascii_case(email))
            .map(|stored| stored.user.clone()))
    }

    async fn check_password(&self, user: &User, password: &str) -> Result<bool, AppError> {
        let password_hash = match self.lock()?.get(&user.id) {
            Some(stored) => stored.password_hash.clone(),
            None => return Ok(false),
        };
        Ok(bcrypt::verify(password, &password_hash)?)
    }

    async fn get_roles(&self, user: &User) -> Result<Vec<String>, AppError> {
        Ok(self
            .lock()?
            .get(&user.id)
            .map(|stored| stored.roles.clone())
            .unwrap_or_default())
    }
}
