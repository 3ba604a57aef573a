//! Credential persistence abstraction.
//!
//! The SQLite implementation lives in the database repository layer.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::error::CredentialError;
use super::types::{Credentials, RefreshState};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Credentials, CredentialError>;

    /// Record the refresh material of the current session.
    async fn persist(&self, user_id: &str, state: &RefreshState) -> Result<(), CredentialError>;

    async fn load_refresh_state(
        &self,
        user_id: &str,
    ) -> Result<Option<RefreshState>, CredentialError>;

    /// Forget the refresh material (logout).
    async fn clear(&self, user_id: &str) -> Result<(), CredentialError>;
}

/// Process-local store, for credentials supplied at start-up and for tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    credentials: Mutex<HashMap<String, Credentials>>,
    refresh: Mutex<HashMap<String, RefreshState>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(credentials: Credentials) -> Self {
        let store = Self::new();
        store.insert(credentials);
        store
    }

    pub fn insert(&self, credentials: Credentials) {
        self.credentials
            .lock()
            .insert(credentials.user_id.clone(), credentials);
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, user_id: &str) -> Result<Credentials, CredentialError> {
        self.credentials
            .lock()
            .get(user_id)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(user_id.to_string()))
    }

    async fn persist(&self, user_id: &str, state: &RefreshState) -> Result<(), CredentialError> {
        self.refresh
            .lock()
            .insert(user_id.to_string(), state.clone());
        Ok(())
    }

    async fn load_refresh_state(
        &self,
        user_id: &str,
    ) -> Result<Option<RefreshState>, CredentialError> {
        Ok(self.refresh.lock().get(user_id).cloned())
    }

    async fn clear(&self, user_id: &str) -> Result<(), CredentialError> {
        self.refresh.lock().remove(user_id);
        Ok(())
    }
}
