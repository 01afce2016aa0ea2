//! The secret store capability.
//!
//! The agent does not own secret storage: a host application injects
//! whatever backend it uses (OS keyring, environment, encrypted KV). The
//! orchestrator only ever reads [`KEY_HMAC_SECRET`] and [`KEY_GITHUB_PAT`];
//! the delivery selector reads [`KEY_METHOD`]. Values travel as
//! `SecretString` so a backend or caller cannot accidentally log them.

use std::collections::HashMap;
use std::sync::RwLock;

use secrecy::SecretString;
use thiserror::Error;

/// HMAC-SHA256 shared secret for request validation.
pub const KEY_HMAC_SECRET: &str = "DEPLOY_HMAC_SECRET";

/// GitHub PAT forwarded as bearer token to the artifact fetcher.
pub const KEY_GITHUB_PAT: &str = "DEPLOY_GITHUB_PAT";

/// Selected delivery variant (defaults to `webhook` when unset).
pub const KEY_METHOD: &str = "DEPLOY_METHOD";

/// Errors from a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend failed; the message must not contain secret material.
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Flat key-value store for deploy secrets and settings.
pub trait Store: Send + Sync {
    /// Reads a key. `Ok(None)` means the key is not set, which is distinct
    /// from a backend failure.
    fn get(&self, key: &str) -> Result<Option<SecretString>, StoreError>;

    /// Writes a key.
    fn set(&self, key: &str, value: SecretString) -> Result<(), StoreError>;
}

/// Store over the process environment. Read-only in practice: `set` updates
/// only this process's environment and does not survive a restart.
pub struct EnvStore;

impl Store for EnvStore {
    fn get(&self, key: &str) -> Result<Option<SecretString>, StoreError> {
        match std::env::var(key) {
            Ok(value) if !value.is_empty() => Ok(Some(SecretString::from(value))),
            Ok(_) | Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(StoreError::Backend(e.to_string())),
        }
    }

    fn set(&self, key: &str, value: SecretString) -> Result<(), StoreError> {
        use secrecy::ExposeSecret;
        // Affects only this process; a persistent backend belongs to the
        // embedding application.
        std::env::set_var(key, value.expose_secret());
        Ok(())
    }
}

/// In-memory store for tests and embedded setups.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, SecretString>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<SecretString>, StoreError> {
        let entries = self
            .entries
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: SecretString) -> Result<(), StoreError> {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entries.insert(key.to_string(), value);
        Ok(())
    }
}
