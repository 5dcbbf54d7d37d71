//! SQLite-backed application store.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moogly_core::error::{MooglyError, Result};
use moogly_core::migrations::{Migration, run_migrations};
use moogly_core::types::UserId;
use rusqlite::{Connection, OptionalExtension};

use crate::application::Application;
use crate::store::ApplicationStore;

const COMPONENT: &str = "application_data";

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create application_data",
        sql: "
            CREATE TABLE IF NOT EXISTS application_data (
                user_id INTEGER PRIMARY KEY,
                fc TEXT NOT NULL,
                ingame_name TEXT
            );
        ",
    },
    Migration {
        version: 2,
        description: "add created_at",
        sql: "ALTER TABLE application_data ADD COLUMN created_at TEXT NOT NULL DEFAULT '';",
    },
];

pub struct SqliteApplicationStore {
    conn: Mutex<Connection>,
}

impl SqliteApplicationStore {
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
}

#[async_trait]
impl ApplicationStore for SqliteApplicationStore {
    async fn get(&self, user: UserId) -> Result<Option<Application>> {
        let conn = self.conn()?;
        let app = conn
            .query_row(
                "SELECT user_id, fc, ingame_name, created_at FROM application_data WHERE user_id = ?1",
                [user.0 as i64],
                |row| {
                    let user_id: i64 = row.get(0)?;
                    let created_at: String = row.get(3)?;
                    Ok(Application {
                        user_id: UserId(user_id as u64),
                        company: row.get(1)?,
                        ingame_name: row.get(2)?,
                        created_at: DateTime::parse_from_rfc3339(&created_at)
                            .map(|d| d.with_timezone(&Utc))
                            .unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(app)
    }

    async fn insert_new(&self, application: &Application) -> Result<bool> {
        let conn = self.conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO application_data (user_id, fc, ingame_name, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                application.user_id.0 as i64,
                application.company,
                application.ingame_name,
                application.created_at.to_rfc3339(),
            ],
        )?;
        Ok(inserted == 1)
    }

    async fn set_ingame_name(&self, user: UserId, name: &str) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE application_data SET ingame_name = ?1 WHERE user_id = ?2",
            rusqlite::params![name, user.0 as i64],
        )?;
        Ok(updated == 1)
    }

    async fn remove(&self, user: UserId) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM application_data WHERE user_id = ?1",
            [user.0 as i64],
        )?;
        Ok(removed == 1)
    }

    async fn clear(&self) -> Result<usize> {
        let conn = self.conn()?;
        Ok(conn.execute("DELETE FROM application_data", [])?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_application_lifecycle() {
        let store = SqliteApplicationStore::open_in_memory().unwrap();
        let app = Application::new(UserId(11), "Moon");

        assert!(store.insert_new(&app).await.unwrap());
        assert!(!store.insert_new(&Application::new(UserId(11), "Seventh Haven")).await.unwrap());

        let loaded = store.get(UserId(11)).await.unwrap().unwrap();
        assert_eq!(loaded.company, "Moon");
        assert_eq!(loaded.ingame_name, None);

        assert!(store.set_ingame_name(UserId(11), "Aria Moon").await.unwrap());
        assert!(!store.set_ingame_name(UserId(12), "Nobody Here").await.unwrap());
        let loaded = store.get(UserId(11)).await.unwrap().unwrap();
        assert_eq!(loaded.ingame_name.as_deref(), Some("Aria Moon"));

        assert!(store.remove(UserId(11)).await.unwrap());
        assert!(!store.remove(UserId(11)).await.unwrap());
        assert!(store.get(UserId(11)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_clear() {
        let store = SqliteApplicationStore::open_in_memory().unwrap();
        for id in 1..=3 {
            store.insert_new(&Application::new(UserId(id), "Moon")).await.unwrap();
        }
        assert_eq!(store.clear().await.unwrap(), 3);
        assert_eq!(store.clear().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reopen_skips_applied_migrations() {
        let dir = std::env::temp_dir().join(format!("moogly-apps-{}", std::process::id()));
        let path = dir.join("moogly.db");
        {
            let store = SqliteApplicationStore::open(&path).unwrap();
            store.insert_new(&Application::new(UserId(5), "Moon")).await.unwrap();
        }
        // Reopening must not re-run v2 (ALTER TABLE would fail).
        let store = SqliteApplicationStore::open(&path).unwrap();
        assert!(store.get(UserId(5)).await.unwrap().is_some());
        std::fs::remove_dir_all(&dir).ok();
    }
}
