//! Per-user serialization of stateful passes.
//!
//! Two sync passes for the same user must never overlap, and day advances for the same
//! user must run one after another. [`UserLocks`] hands out one async mutex per user id;
//! passes for different users never contend. Idle entries are pruned whenever the
//! registry is touched, so it only tracks users with a pass running or queued.

use crate::errors::{Error, Result};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

/// Registry of per-user async locks.
#[derive(Debug, Default, Clone)]
pub struct UserLocks {
    locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl UserLocks {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, user_id: &str) -> Arc<AsyncMutex<()>> {
        // No operation leaves the map half-updated, so a poisoned guard still holds a valid map
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Guards and queued waiters each hold a clone; a lone reference is idle
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(user_id.to_string()).or_default())
    }

    /// Number of users currently holding or waiting for a lock, plus any idle entries
    /// not yet pruned.
    #[must_use]
    pub fn tracked_users(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Takes the user's lock without waiting.
    ///
    /// # Errors
    /// `Error::SyncConflict` if another pass for the same user holds it.
    pub fn try_acquire(&self, user_id: &str) -> Result<OwnedMutexGuard<()>> {
        self.lock_for(user_id).try_lock_owned().map_err(|_| {
            debug!(user_id, "Pass already in flight");
            Error::SyncConflict {
                user_id: user_id.to_string(),
            }
        })
    }

    /// Waits for the user's lock.
    pub async fn acquire(&self, user_id: &str) -> OwnedMutexGuard<()> {
        self.lock_for(user_id).lock_owned().await
    }
}
