//! Per-app update serialisation.
//!
//! At most one update pipeline may run per managed app. Contending requests
//! are rejected immediately (the handler answers 409) rather than queued:
//! queuing would hide publisher-side retry storms behind ever-longer waits,
//! and the publisher's retry is the right place to resolve the race.
//!
//! Locks are keyed by app name. The registry itself is guarded by a std
//! `RwLock` (never held across an await); the per-app locks are tokio
//! mutexes whose owned guards live for the whole pipeline.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Registry of per-app update locks.
#[derive(Default)]
pub struct AppLocks {
    locks: RwLock<HashMap<String, Arc<Mutex<()>>>>,
}

impl AppLocks {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attempts to claim the update lock for `app`.
    ///
    /// Returns `None` when an update for the same app is already in flight.
    /// The returned guard releases the lock on drop, at the end of the
    /// pipeline.
    pub fn try_claim(&self, app: &str) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let registry = self
                .locks
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            registry.get(app).cloned()
        };

        let lock = match lock {
            Some(lock) => lock,
            None => {
                let mut registry = self
                    .locks
                    .write()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                registry
                    .entry(app.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(())))
                    .clone()
            }
        };

        lock.try_lock_owned().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_then_contend_then_release() {
        let locks = AppLocks::new();

        let guard = locks.try_claim("myapp").expect("first claim succeeds");
        assert!(locks.try_claim("myapp").is_none(), "second claim rejected");

        drop(guard);
        assert!(locks.try_claim("myapp").is_some(), "released lock reclaims");
    }

    #[test]
    fn distinct_apps_do_not_contend() {
        let locks = AppLocks::new();

        let _a = locks.try_claim("app-a").unwrap();
        assert!(locks.try_claim("app-b").is_some());
    }
}
