//! Event store interface and the in-memory implementation.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use moogly_core::error::{MooglyError, Result};
use moogly_core::types::MessageId;

use crate::event::MapsRun;

/// Durable table of maps runs, keyed by announcement id.
///
/// Read-modify-write sequences on one run are serialized by `EventLocks`;
/// each call here is atomic on its own.
#[async_trait]
pub trait EventStore: Send + Sync {
    async fn get(&self, id: MessageId) -> Result<Option<MapsRun>>;

    /// Insert or replace.
    async fn put(&self, run: &MapsRun) -> Result<()>;

    /// Runs whose reminder has not been sent, by start time.
    async fn list_pending(&self) -> Result<Vec<MapsRun>>;

    async fn list_all(&self) -> Result<Vec<MapsRun>>;
}

/// In-memory store.
#[derive(Default)]
pub struct MemoryEventStore {
    runs: Mutex<BTreeMap<MessageId, MapsRun>>,
}

impl MemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn runs(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<MessageId, MapsRun>>> {
        self.runs
            .lock()
            .map_err(|e| MooglyError::Database(format!("Lock: {e}")))
    }
}

#[async_trait]
impl EventStore for MemoryEventStore {
    async fn get(&self, id: MessageId) -> Result<Option<MapsRun>> {
        Ok(self.runs()?.get(&id).cloned())
    }

    async fn put(&self, run: &MapsRun) -> Result<()> {
        self.runs()?.insert(run.id, run.clone());
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<MapsRun>> {
        let mut pending: Vec<MapsRun> = self
            .runs()?
            .values()
            .filter(|r| !r.notified())
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.trigger_time);
        Ok(pending)
    }

    async fn list_all(&self) -> Result<Vec<MapsRun>> {
        Ok(self.runs()?.values().cloned().collect())
    }
}
