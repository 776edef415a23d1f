//! Per-questionnaire critical sections within one process.
//!
//! Cross-process exclusion comes from the store (`commit_publish` /
//! `commit_unpublish` check the counter under a row lock); these locks keep
//! a single process from racing itself and wasting retries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use qpub_core::types::DbId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Async mutexes keyed by questionnaire id, created on demand.
#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<DbId, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `questionnaire_id`. Released on drop.
    pub async fn acquire(&self, questionnaire_id: DbId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self
                .locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            // Entries nobody holds or waits on are only referenced by the map.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(questionnaire_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Number of questionnaires currently held or waited on.
    pub fn active(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}
