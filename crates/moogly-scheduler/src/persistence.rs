//! SQLite-backed event store.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moogly_core::error::{MooglyError, Result};
use moogly_core::migrations::{Migration, run_migrations};
use moogly_core::types::{MessageId, UserId};
use rusqlite::{Connection, OptionalExtension};

use crate::event::MapsRun;
use crate::store::EventStore;

const COMPONENT: &str = "maps_runs";

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "create maps_runs",
    sql: "
        CREATE TABLE IF NOT EXISTS maps_runs (
            message_id INTEGER PRIMARY KEY,
            display_timestamp TEXT NOT NULL,
            trigger_timestamp TEXT NOT NULL,     -- RFC 3339, UTC
            capacity INTEGER NOT NULL DEFAULT 8,
            participant_ids TEXT NOT NULL DEFAULT '',  -- comma-delimited user ids, join order
            notified INTEGER NOT NULL DEFAULT 0
        );
        CREATE INDEX IF NOT EXISTS idx_maps_runs_pending ON maps_runs (notified, trigger_timestamp);
    ",
}];

const SELECT_COLUMNS: &str =
    "SELECT message_id, display_timestamp, trigger_timestamp, capacity, participant_ids, notified FROM maps_runs";

/// SQLite event store.
pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;").ok();
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        run_migrations(&conn, COMPONENT, MIGRATIONS)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| MooglyError::Database(format!("Lock: {e}")))
    }

    fn query(&self, sql: &str) -> Result<Vec<MapsRun>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql)?;
        let rows = stmt.query_map([], row_to_run)?;
        let mut runs = Vec::new();
        for row in rows {
            match row {
                Ok(run) => runs.push(run),
                Err(e) => tracing::warn!("⚠️ Skipping unreadable maps_runs row: {e}"),
            }
        }
        Ok(runs)
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn get(&self, id: MessageId) -> Result<Option<MapsRun>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE message_id = ?1"),
                [id.0 as i64],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    async fn put(&self, run: &MapsRun) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO maps_runs
                (message_id, display_timestamp, trigger_timestamp, capacity, participant_ids, notified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(message_id) DO UPDATE SET
                display_timestamp = excluded.display_timestamp,
                trigger_timestamp = excluded.trigger_timestamp,
                capacity = excluded.capacity,
                participant_ids = excluded.participant_ids,
                notified = excluded.notified",
            rusqlite::params![
                run.id.0 as i64,
                run.display_time,
                run.trigger_time.to_rfc3339(),
                run.capacity,
                encode_participants(run.participants()),
                run.notified() as i32,
            ],
        )?;
        tracing::debug!("💾 Saved maps run {}", run.id);
        Ok(())
    }

    async fn list_pending(&self) -> Result<Vec<MapsRun>> {
        self.query(&format!(
            "{SELECT_COLUMNS} WHERE notified = 0 ORDER BY trigger_timestamp"
        ))
    }

    async fn list_all(&self) -> Result<Vec<MapsRun>> {
        self.query(&format!("{SELECT_COLUMNS} ORDER BY trigger_timestamp"))
    }
}

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<MapsRun> {
    let id: i64 = row.get(0)?;
    let display_time: String = row.get(1)?;
    let trigger_str: String = row.get(2)?;
    let capacity: u32 = row.get(3)?;
    let participants_str: String = row.get(4)?;
    let notified: bool = row.get::<_, i32>(5)? != 0;

    let trigger_time = DateTime::parse_from_rfc3339(&trigger_str)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
        })?;

    Ok(MapsRun::restore(
        MessageId(id as u64),
        display_time,
        trigger_time,
        capacity,
        decode_participants(&participants_str),
        notified,
    ))
}

/// `[1, 2, 3]` → `"1,2,3"`.
pub fn encode_participants(users: &[UserId]) -> String {
    users
        .iter()
        .map(|u| u.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Inverse of `encode_participants`; blank and malformed entries are skipped.
pub fn decode_participants(s: &str) -> Vec<UserId> {
    s.split(',')
        .filter(|part| !part.trim().is_empty())
        .filter_map(|part| match part.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!("⚠️ Ignoring malformed participant id '{part}'");
                None
            }
        })
        .collect()
}
