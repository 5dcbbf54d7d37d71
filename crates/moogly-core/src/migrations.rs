//! Versioned SQLite migrations.
//!
//! Each store owns a `component` name and an ordered list of migrations.
//! Applied versions are recorded in `schema_migrations`, so a migration runs
//! exactly once per database and columns are never reshuffled in place.

use rusqlite::Connection;

use crate::error::{MooglyError, Result};

/// One schema step.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// Highest applied version for `component` (0 when none).
pub fn current_version(conn: &Connection, component: &str) -> Result<u32> {
    ensure_table(conn)?;
    let version: Option<u32> = conn.query_row(
        "SELECT MAX(version) FROM schema_migrations WHERE component = ?1",
        [component],
        |row| row.get(0),
    )?;
    Ok(version.unwrap_or(0))
}

/// Apply every migration newer than the recorded version, each in its own transaction.
/// Returns the resulting version.
pub fn run_migrations(conn: &Connection, component: &str, migrations: &[Migration]) -> Result<u32> {
    let start = current_version(conn, component)?;
    let mut version = start;

    for migration in migrations.iter().filter(|m| m.version > start) {
        if migration.version != version + 1 {
            return Err(MooglyError::Database(format!(
                "{component}: migration gap, at v{version} but next is v{}",
                migration.version
            )));
        }

        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(migration.sql).map_err(|e| {
            MooglyError::Database(format!(
                "{component} v{} ({}): {e}",
                migration.version, migration.description
            ))
        })?;
        tx.execute(
            "INSERT INTO schema_migrations (component, version, description, applied_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![
                component,
                migration.version,
                migration.description,
                chrono::Utc::now().to_rfc3339()
            ],
        )?;
        tx.commit()?;

        tracing::info!(
            "🗄️ {component}: applied migration v{} ({})",
            migration.version,
            migration.description
        );
        version = migration.version;
    }

    Ok(version)
}

fn ensure_table(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            component TEXT NOT NULL,
            version INTEGER NOT NULL,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL,
            PRIMARY KEY (component, version)
        );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STEPS: &[Migration] = &[
        Migration {
            version: 1,
            description: "create things",
            sql: "CREATE TABLE things (id INTEGER PRIMARY KEY);",
        },
        Migration {
            version: 2,
            description: "add label",
            sql: "ALTER TABLE things ADD COLUMN label TEXT NOT NULL DEFAULT '';",
        },
    ];

    #[test]
    fn test_runs_each_migration_once() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&conn, "things", STEPS).unwrap(), 2);
        // Second run is a no-op; re-running ALTER TABLE would fail.
        assert_eq!(run_migrations(&conn, "things", STEPS).unwrap(), 2);
        assert_eq!(current_version(&conn, "things").unwrap(), 2);
        assert_eq!(current_version(&conn, "other").unwrap(), 0);
    }

    #[test]
    fn test_rejects_gaps() {
        let conn = Connection::open_in_memory().unwrap();
        let gapped = [STEPS[1]];
        assert!(run_migrations(&conn, "things", &gapped).is_err());
    }

    #[test]
    fn test_resumes_from_recorded_version() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&conn, "things", &STEPS[..1]).unwrap(), 1);
        assert_eq!(run_migrations(&conn, "things", STEPS).unwrap(), 2);
        conn.execute("INSERT INTO things (id, label) VALUES (1, 'x')", [])
            .unwrap();
    }
}
