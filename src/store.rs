//! Storage boundary for learner records and settings.
//!
//! Engines never touch storage; use cases load a record, compute a new one, and
//! write it back through `UserRepository::compare_and_swap`. Every stored record
//! carries a version that bumps on each write, so a writer holding a stale copy
//! gets `ServiceError::Conflict` rather than overwriting a concurrent update.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::domain::{SettingsPatch, SystemSettings, User};
use crate::error::{ContractViolation, ServiceError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Versioned<T> {
    pub version: u64,
    pub value: T,
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, id: &str) -> Option<Versioned<User>>;

    /// Store a record under a new id. Fails if the id is taken.
    async fn insert(&self, user: User) -> Result<Versioned<User>, ServiceError>;

    /// Replace the record only if it is still at `expected_version`.
    async fn compare_and_swap(&self, expected_version: u64, user: User) -> Result<Versioned<User>, ServiceError>;
}

#[async_trait]
pub trait SettingsProvider: Send + Sync {
    async fn current(&self) -> SystemSettings;

    async fn replace(&self, settings: SystemSettings) -> Result<SystemSettings, ContractViolation>;

    /// Merge `patch` over the settings in force and store the result if valid.
    async fn update(&self, patch: &SettingsPatch) -> Result<SystemSettings, ContractViolation>;
}

#[derive(Clone, Default)]
pub struct InMemoryUserRepository {
    by_id: Arc<RwLock<HashMap<String, Versioned<User>>>>,
}

impl InMemoryUserRepository {
    pub fn with_users(users: impl IntoIterator<Item = User>) -> Self {
        let by_id = users
            .into_iter()
            .map(|u| (u.id.clone(), Versioned { version: 1, value: u }))
            .collect();
        Self { by_id: Arc::new(RwLock::new(by_id)) }
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn get(&self, id: &str) -> Option<Versioned<User>> {
        self.by_id.read().await.get(id).cloned()
    }

    #[instrument(level = "debug", skip(self, user), fields(id = %user.id))]
    async fn insert(&self, user: User) -> Result<Versioned<User>, ServiceError> {
        let mut by_id = self.by_id.write().await;
        if by_id.contains_key(&user.id) {
            return Err(ServiceError::AlreadyExists { id: user.id });
        }
        let stored = Versioned { version: 1, value: user };
        by_id.insert(stored.value.id.clone(), stored.clone());
        Ok(stored)
    }

    #[instrument(level = "debug", skip(self, user), fields(id = %user.id))]
    async fn compare_and_swap(&self, expected_version: u64, user: User) -> Result<Versioned<User>, ServiceError> {
        let mut by_id = self.by_id.write().await;
        let Some(current) = by_id.get_mut(&user.id) else {
            return Err(ServiceError::NotFound(user.id));
        };
        if current.version != expected_version {
            warn!(target: "store", id = %user.id, expected_version, found = current.version, "Stale write rejected");
            return Err(ServiceError::Conflict { id: user.id, expected: expected_version, found: current.version });
        }
        current.version += 1;
        current.value = user;
        debug!(target: "store", id = %current.value.id, version = current.version, "User saved");
        Ok(current.clone())
    }
}

pub struct InMemorySettings {
    inner: RwLock<SystemSettings>,
}

impl InMemorySettings {
    /// Settings must already be valid; `replace` validates later updates.
    pub fn new(settings: SystemSettings) -> Self {
        Self { inner: RwLock::new(settings) }
    }
}

#[async_trait]
impl SettingsProvider for InMemorySettings {
    async fn current(&self) -> SystemSettings {
        self.inner.read().await.clone()
    }

    async fn replace(&self, settings: SystemSettings) -> Result<SystemSettings, ContractViolation> {
        settings.validate()?;
        *self.inner.write().await = settings.clone();
        Ok(settings)
    }

    async fn update(&self, patch: &SettingsPatch) -> Result<SystemSettings, ContractViolation> {
        let mut current = self.inner.write().await;
        let merged = patch.apply_to(&current);
        merged.validate()?;
        *current = merged.clone();
        Ok(merged)
    }
}
