//! Database migrations

use crate::error::Result;
use crate::util::now_rfc3339;
use rusqlite::{params, Connection};

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Get the current schema version
fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get::<_, i32>(0).map(|flag| flag != 0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version: i32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Migration to version 1: Initial schema
///
/// No foreign key from tasks to projects: pull responses are unordered, so
/// a task row may land before its project does.
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        BEGIN;

        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            slug TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            color TEXT NOT NULL DEFAULT '#4ECDC4',
            deleted INTEGER NOT NULL DEFAULT 0,
            sync_version INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_projects_dirty ON projects(sync_version);

        CREATE TABLE IF NOT EXISTS tasks (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL DEFAULT 'inbox',
            content TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'process',
            priority INTEGER NOT NULL DEFAULT 4,
            due_date TEXT,
            deleted INTEGER NOT NULL DEFAULT 0,
            sync_version INTEGER,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_project ON tasks(project_id);
        CREATE INDEX IF NOT EXISTS idx_tasks_status ON tasks(status);
        CREATE INDEX IF NOT EXISTS idx_tasks_dirty ON tasks(sync_version);

        INSERT INTO schema_version (version) VALUES (1);

        COMMIT;
        ",
    )?;

    // Seed the inbox at version 0 so it never counts as a local edit.
    let now = now_rfc3339();
    conn.execute(
        "INSERT OR IGNORE INTO projects (id, slug, name, color, deleted, sync_version, created_at, updated_at)
         VALUES ('inbox', 'inbox', 'Inbox', '#6C757D', 0, 0, ?1, ?2)",
        params![now, now],
    )?;

    tracing::info!("Migrated local database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();
        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_inbox_is_seeded_synced() {
        let conn = setup();
        run(&conn).unwrap();

        let (id, version): (String, Option<i64>) = conn
            .query_row(
                "SELECT id, sync_version FROM projects WHERE id = 'inbox'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(id, "inbox");
        assert_eq!(version, Some(0));
    }
}
