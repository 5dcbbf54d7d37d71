//! # Moogly Scheduler
//!
//! Maps runs: timed group activities with a capacity limit, a Join button
//! and a one-shot reminder posted shortly before the start.
//!
//! ## Architecture
//! ```text
//! EventController
//!   ├── create_event  → post announcement → EventStore::put → live surface
//!   ├── join          → EventLocks[id] → MapsRun::join → put → edit announcement
//!   └── recover_pending_events (startup)
//!
//! ReminderEngine (tokio interval, default 60s)
//!   └── list_pending → due? → EventLocks[id] → send reminder → mark_notified → put
//! ```
//!
//! Stores: `MemoryEventStore` (tests) and `SqliteEventStore` (production).

pub mod engine;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod locks;
pub mod persistence;
pub mod render;
pub mod store;
pub mod timestamp;

#[cfg(test)]
pub(crate) mod testing;

pub use engine::{ReminderEngine, ReminderSettings, TickReport, spawn_reminder_loop};
pub use error::EventError;
pub use event::{JoinRejection, MapsRun, RunState};
pub use lifecycle::{EventController, JoinOutcome};
pub use locks::EventLocks;
pub use persistence::SqliteEventStore;
pub use store::{EventStore, MemoryEventStore};
