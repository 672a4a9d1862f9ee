//! User service adapter.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UserStatus {
    #[default]
    Normal,
    Disabled,
}

/// A user account as seen by the other services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub nickname: String,
    pub status: UserStatus,
    pub registered_at: DateTime<Utc>,
}

/// Read-only RPC surface of the user service.
#[async_trait]
pub trait UserService: Send + Sync {
    /// Loads a user. Disabled accounts are reported as not found.
    async fn get_user(&self, user_id: UserId) -> Result<User, AppError>;

    /// Loads the active users among `user_ids`, skipping unknown ones.
    async fn get_users(&self, user_ids: &[UserId]) -> Result<Vec<User>, AppError>;
}

#[derive(Debug, Default)]
struct InMemoryUserState {
    users: HashMap<UserId, User>,
    fail_on_get: bool,
}

/// In-memory user directory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserService {
    state: Arc<RwLock<InMemoryUserState>>,
}

impl InMemoryUserService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new active user.
    pub fn register(&self, nickname: impl Into<String>) -> User {
        let user = User {
            id: UserId::new(),
            nickname: nickname.into(),
            status: UserStatus::Normal,
            registered_at: Utc::now(),
        };
        self.write().users.insert(user.id, user.clone());
        user
    }

    pub fn set_status(&self, user_id: UserId, status: UserStatus) {
        if let Some(user) = self.write().users.get_mut(&user_id) {
            user.status = status;
        }
    }

    pub fn set_fail_on_get(&self, fail: bool) {
        self.write().fail_on_get = fail;
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryUserState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, InMemoryUserState>, AppError> {
        let state = self.state.read().unwrap_or_else(PoisonError::into_inner);
        if state.fail_on_get {
            return Err(AppError::Unavailable {
                service: "user",
                reason: "lookup failed".into(),
            });
        }
        Ok(state)
    }
}

#[async_trait]
impl UserService for InMemoryUserService {
    async fn get_user(&self, user_id: UserId) -> Result<User, AppError> {
        self.read()?
            .users
            .get(&user_id)
            .filter(|user| user.status == UserStatus::Normal)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("user {user_id}")))
    }

    async fn get_users(&self, user_ids: &[UserId]) -> Result<Vec<User>, AppError> {
        let state = self.read()?;
        Ok(user_ids
            .iter()
            .filter_map(|id| state.users.get(id))
            .filter(|user| user.status == UserStatus::Normal)
            .cloned()
            .collect())
    }
}
