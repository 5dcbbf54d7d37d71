//! Per-run async locks.
//!
//! Every read-modify-write of a run (join, deliver + mark notified) holds the
//! run's lock, so overlapping joins cannot both take the last slot and
//! overlapping reminder ticks cannot both deliver.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use moogly_core::types::MessageId;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Default)]
pub struct EventLocks {
    locks: Mutex<HashMap<MessageId, Arc<AsyncMutex<()>>>>,
}

impl EventLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to run `id`.
    pub async fn lock(&self, id: MessageId) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
            locks.entry(id).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Number of runs that have been locked at least once.
    pub fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
