//! Authoritative per-user state and the global version sequence.
//!
//! Every accepted upsert draws the next value from a one-row sequence
//! table inside the same transaction, so versions assigned to a user are
//! strictly increasing even when pushes from different replicas interleave.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use crate::error::AppError;

/// A registered account
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Current server copy of a project row
#[derive(Debug, Clone)]
pub struct ServerProject {
    pub client_id: String,
    pub slug: String,
    pub name: String,
    pub color: String,
    pub encrypted_data: Vec<u8>,
    pub sync_version: i64,
    pub deleted: bool,
    pub client_updated_at: Option<DateTime<Utc>>,
}

/// Current server copy of a task row
#[derive(Debug, Clone)]
pub struct ServerTask {
    pub client_id: String,
    pub project_id: String,
    pub encrypted_content: Vec<u8>,
    pub status: String,
    pub priority: i32,
    pub due_date: Option<String>,
    pub sync_version: i64,
    pub deleted: bool,
    pub client_updated_at: Option<DateTime<Utc>>,
}

/// Fields of one incoming project upsert
#[derive(Debug)]
pub struct ProjectWrite<'a> {
    pub client_id: &'a str,
    pub slug: &'a str,
    pub name: &'a str,
    pub color: &'a str,
    pub encrypted_data: &'a [u8],
    pub deleted: bool,
    pub client_updated_at: Option<DateTime<Utc>>,
}

/// Fields of one incoming task upsert
#[derive(Debug)]
pub struct TaskWrite<'a> {
    pub client_id: &'a str,
    pub project_id: &'a str,
    pub encrypted_content: &'a [u8],
    pub status: &'a str,
    pub priority: i32,
    pub due_date: Option<&'a str>,
    pub deleted: bool,
    pub client_updated_at: Option<DateTime<Utc>>,
}

/// SQLite-backed server store, single connection behind a mutex.
pub struct ServerStore {
    conn: Mutex<Connection>,
}

impl ServerStore {
    /// Open (or create) the store at `path`; `:memory:` is ephemeral.
    pub fn open(path: &str) -> Result<Self, AppError> {
        let conn = if path == ":memory:" {
            Connection::open_in_memory()?
        } else {
            Connection::open(path)?
        };
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            ",
        )?;
        migrate(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("server store mutex poisoned")
    }

    // ------------------------------------------------------------------
    // Accounts & sessions
    // ------------------------------------------------------------------

    /// Insert a user; unique violations surface as 409.
    pub fn create_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<String, AppError> {
        let id = uuid::Uuid::new_v4().to_string();
        let result = self.lock().execute(
            "INSERT INTO users (id, username, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![id, username, email, password_hash, now_text()],
        );
        match result {
            Ok(_) => Ok(id),
            Err(rusqlite::Error::SqliteFailure(code, _))
                if code.code == ErrorCode::ConstraintViolation =>
            {
                Err(AppError::conflict("username or email already exists"))
            }
            Err(error) => Err(error.into()),
        }
    }

    pub fn user_by_username(&self, username: &str) -> Result<Option<UserRecord>, AppError> {
        let user = self
            .lock()
            .query_row(
                "SELECT id, username, email, password_hash FROM users WHERE username = ?1",
                params![username],
                parse_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn user_by_email(&self, email: &str) -> Result<Option<UserRecord>, AppError> {
        let user = self
            .lock()
            .query_row(
                "SELECT id, username, email, password_hash FROM users WHERE email = ?1",
                params![email],
                parse_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn user_by_id(&self, id: &str) -> Result<Option<UserRecord>, AppError> {
        let user = self
            .lock()
            .query_row(
                "SELECT id, username, email, password_hash FROM users WHERE id = ?1",
                params![id],
                parse_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn create_session(
        &self,
        user_id: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.lock().execute(
            "INSERT INTO sessions (token, user_id, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![token, user_id, text(expires_at), now_text()],
        )?;
        Ok(())
    }

    /// Resolve a session token to its user, if the session has not expired.
    pub fn session_user(&self, token: &str) -> Result<Option<String>, AppError> {
        let row = self
            .lock()
            .query_row(
                "SELECT user_id, expires_at FROM sessions WHERE token = ?1",
                params![token],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                    ))
                },
            )
            .optional()?;

        let Some((user_id, expires_raw)) = row else {
            return Ok(None);
        };
        match parse_text(&expires_raw) {
            Some(expires_at) if expires_at > Utc::now() => Ok(Some(user_id)),
            _ => Ok(None),
        }
    }

    pub fn delete_session(&self, token: &str) -> Result<(), AppError> {
        self.lock()
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
        Ok(())
    }

    pub fn create_magic_link(
        &self,
        email: &str,
        token: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.lock().execute(
            "INSERT INTO magic_links (token, email, expires_at, used, created_at)
             VALUES (?1, ?2, ?3, 0, ?4)",
            params![token, email, text(expires_at), now_text()],
        )?;
        Ok(())
    }

    /// Redeem a magic link: single use, expiring. Returns the email.
    pub fn redeem_magic_link(&self, token: &str) -> Result<String, AppError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT email, expires_at, used FROM magic_links WHERE token = ?1",
                params![token],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i32>(2)? != 0,
                    ))
                },
            )
            .optional()?;

        let Some((email, expires_raw, used)) = row else {
            return Err(AppError::bad_request("invalid token"));
        };
        if used {
            return Err(AppError::bad_request("token already used"));
        }
        match parse_text(&expires_raw) {
            Some(expires_at) if expires_at > Utc::now() => {}
            _ => return Err(AppError::bad_request("token expired")),
        }

        conn.execute(
            "UPDATE magic_links SET used = 1 WHERE token = ?1",
            params![token],
        )?;
        Ok(email)
    }

    // ------------------------------------------------------------------
    // Sync rows
    // ------------------------------------------------------------------

    /// Upsert a project row, assigning a fresh version from the sequence.
    pub fn upsert_project(
        &self,
        user_id: &str,
        write: &ProjectWrite<'_>,
    ) -> Result<i64, AppError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let version = next_version(&tx)?;
        tx.execute(
            "INSERT INTO projects
                 (user_id, client_id, slug, name, color, encrypted_data, sync_version, deleted, client_updated_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
             ON CONFLICT(user_id, client_id) DO UPDATE SET
                 slug = excluded.slug,
                 name = excluded.name,
                 color = excluded.color,
                 encrypted_data = excluded.encrypted_data,
                 sync_version = excluded.sync_version,
                 deleted = excluded.deleted,
                 client_updated_at = excluded.client_updated_at,
                 updated_at = excluded.updated_at",
            params![
                user_id,
                write.client_id,
                write.slug,
                write.name,
                write.color,
                write.encrypted_data,
                version,
                i32::from(write.deleted),
                write.client_updated_at.map(text),
                now_text(),
            ],
        )?;
        tx.commit()?;
        Ok(version)
    }

    /// Upsert a task row, assigning a fresh version from the sequence.
    pub fn upsert_task(&self, user_id: &str, write: &TaskWrite<'_>) -> Result<i64, AppError> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let version = next_version(&tx)?;
        tx.execute(
            "INSERT INTO tasks
                 (user_id, client_id, project_id, encrypted_content, status, priority, due_date, sync_version, deleted, client_updated_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)
             ON CONFLICT(user_id, client_id) DO UPDATE SET
                 project_id = excluded.project_id,
                 encrypted_content = excluded.encrypted_content,
                 status = excluded.status,
                 priority = excluded.priority,
                 due_date = excluded.due_date,
                 sync_version = excluded.sync_version,
                 deleted = excluded.deleted,
                 client_updated_at = excluded.client_updated_at,
                 updated_at = excluded.updated_at",
            params![
                user_id,
                write.client_id,
                write.project_id,
                write.encrypted_content,
                write.status,
                write.priority,
                write.due_date,
                version,
                i32::from(write.deleted),
                write.client_updated_at.map(text),
                now_text(),
            ],
        )?;
        tx.commit()?;
        Ok(version)
    }

    /// Current server project, as the push handler's conflict check sees it.
    pub fn project_for_conflict(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> Result<Option<ServerProject>, AppError> {
        let project = self
            .lock()
            .query_row(
                "SELECT client_id, slug, name, color, encrypted_data, sync_version, deleted, client_updated_at
                 FROM projects WHERE user_id = ?1 AND client_id = ?2",
                params![user_id, client_id],
                parse_project,
            )
            .optional()?;
        Ok(project)
    }

    /// Current server task, as the push handler's conflict check sees it.
    pub fn task_for_conflict(
        &self,
        user_id: &str,
        client_id: &str,
    ) -> Result<Option<ServerTask>, AppError> {
        let task = self
            .lock()
            .query_row(
                "SELECT client_id, project_id, encrypted_content, status, priority, due_date, sync_version, deleted, client_updated_at
                 FROM tasks WHERE user_id = ?1 AND client_id = ?2",
                params![user_id, client_id],
                parse_task,
            )
            .optional()?;
        Ok(task)
    }

    /// Every project row with `sync_version > since`, deleted included.
    pub fn projects_changed_since(
        &self,
        user_id: &str,
        since: i64,
    ) -> Result<Vec<ServerProject>, AppError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT client_id, slug, name, color, encrypted_data, sync_version, deleted, client_updated_at
             FROM projects WHERE user_id = ?1 AND sync_version > ?2",
        )?;
        let projects = stmt
            .query_map(params![user_id, since], parse_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    /// Every task row with `sync_version > since`, deleted included.
    pub fn tasks_changed_since(
        &self,
        user_id: &str,
        since: i64,
    ) -> Result<Vec<ServerTask>, AppError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT client_id, project_id, encrypted_content, status, priority, due_date, sync_version, deleted, client_updated_at
             FROM tasks WHERE user_id = ?1 AND sync_version > ?2",
        )?;
        let tasks = stmt
            .query_map(params![user_id, since], parse_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    /// Hard-delete every project and task for `user_id` (force-push mode).
    pub fn clear_user(&self, user_id: &str) -> Result<(), AppError> {
        let conn = self.lock();
        conn.execute("DELETE FROM tasks WHERE user_id = ?1", params![user_id])?;
        conn.execute("DELETE FROM projects WHERE user_id = ?1", params![user_id])?;
        Ok(())
    }
}

/// Draw the next value from the global sequence, inside the caller's
/// transaction.
fn next_version(conn: &Connection) -> Result<i64, AppError> {
    conn.execute("UPDATE sync_sequence SET value = value + 1 WHERE id = 1", [])?;
    let version = conn.query_row("SELECT value FROM sync_sequence WHERE id = 1", [], |row| {
        row.get(0)
    })?;
    Ok(version)
}

fn migrate(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "
        BEGIN;

        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT NOT NULL UNIQUE,
            password_hash TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sessions (
            token TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id),
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

        CREATE TABLE IF NOT EXISTS magic_links (
            token TEXT PRIMARY KEY,
            email TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            used INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS projects (
            user_id TEXT NOT NULL,
            client_id TEXT NOT NULL,
            slug TEXT NOT NULL,
            name TEXT NOT NULL,
            color TEXT NOT NULL DEFAULT '#4ECDC4',
            encrypted_data BLOB,
            sync_version INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            client_updated_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, client_id)
        );
        CREATE INDEX IF NOT EXISTS idx_projects_sync ON projects(user_id, sync_version);

        CREATE TABLE IF NOT EXISTS tasks (
            user_id TEXT NOT NULL,
            client_id TEXT NOT NULL,
            project_id TEXT NOT NULL,
            encrypted_content BLOB,
            status TEXT NOT NULL DEFAULT 'process',
            priority INTEGER NOT NULL DEFAULT 4,
            due_date TEXT,
            sync_version INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            client_updated_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (user_id, client_id)
        );
        CREATE INDEX IF NOT EXISTS idx_tasks_sync ON tasks(user_id, sync_version);

        CREATE TABLE IF NOT EXISTS sync_sequence (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            value INTEGER NOT NULL
        );

        -- Seed (or re-seed after a schema upgrade) at the max version
        -- already assigned, so the sequence stays monotonic.
        INSERT OR IGNORE INTO sync_sequence (id, value)
        VALUES (1, COALESCE((
            SELECT MAX(v) FROM (
                SELECT MAX(sync_version) AS v FROM projects
                UNION ALL
                SELECT MAX(sync_version) AS v FROM tasks
            )
        ), 0));

        COMMIT;
        ",
    )?;

    Ok(())
}

fn parse_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
    })
}

fn parse_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServerProject> {
    Ok(ServerProject {
        client_id: row.get(0)?,
        slug: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        encrypted_data: row.get::<_, Option<Vec<u8>>>(4)?.unwrap_or_default(),
        sync_version: row.get(5)?,
        deleted: row.get::<_, i32>(6)? != 0,
        client_updated_at: row
            .get::<_, Option<String>>(7)?
            .as_deref()
            .and_then(parse_text),
    })
}

fn parse_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<ServerTask> {
    Ok(ServerTask {
        client_id: row.get(0)?,
        project_id: row.get(1)?,
        encrypted_content: row.get::<_, Option<Vec<u8>>>(2)?.unwrap_or_default(),
        status: row.get(3)?,
        priority: row.get(4)?,
        due_date: row.get(5)?,
        sync_version: row.get(6)?,
        deleted: row.get::<_, i32>(7)? != 0,
        client_updated_at: row
            .get::<_, Option<String>>(8)?
            .as_deref()
            .and_then(parse_text),
    })
}

fn text(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

fn parse_text(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|parsed| parsed.with_timezone(&Utc))
}

fn now_text() -> String {
    text(Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn setup() -> ServerStore {
        ServerStore::open(":memory:").unwrap()
    }

    fn project_write<'a>(client_id: &'a str, name: &'a str) -> ProjectWrite<'a> {
        ProjectWrite {
            client_id,
            slug: name,
            name,
            color: "#4ECDC4",
            encrypted_data: b"blob",
            deleted: false,
            client_updated_at: None,
        }
    }

    fn task_write<'a>(client_id: &'a str) -> TaskWrite<'a> {
        TaskWrite {
            client_id,
            project_id: "inbox",
            encrypted_content: b"content-blob",
            status: "process",
            priority: 4,
            due_date: None,
            deleted: false,
            client_updated_at: None,
        }
    }

    #[test]
    fn versions_are_strictly_increasing_across_kinds() {
        let store = setup();
        let v1 = store.upsert_project("u1", &project_write("p1", "one")).unwrap();
        let v2 = store.upsert_task("u1", &task_write("t1")).unwrap();
        let v3 = store.upsert_task("u1", &task_write("t1")).unwrap();
        assert!(v1 < v2 && v2 < v3);
    }

    #[test]
    fn sequence_survives_reopen_with_existing_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.db");
        let path = path.to_str().unwrap();

        let last = {
            let store = ServerStore::open(path).unwrap();
            store.upsert_task("u1", &task_write("t1")).unwrap();
            store.upsert_task("u1", &task_write("t2")).unwrap()
        };

        let store = ServerStore::open(path).unwrap();
        let next = store.upsert_task("u1", &task_write("t3")).unwrap();
        assert!(next > last);
    }

    #[test]
    fn upsert_overwrites_existing_row() {
        let store = setup();
        store.upsert_task("u1", &task_write("t1")).unwrap();

        let mut write = task_write("t1");
        write.status = "done";
        write.deleted = true;
        let version = store.upsert_task("u1", &write).unwrap();

        let row = store.task_for_conflict("u1", "t1").unwrap().unwrap();
        assert_eq!(row.status, "done");
        assert!(row.deleted);
        assert_eq!(row.sync_version, version);
    }

    #[test]
    fn changed_since_filters_strictly_and_includes_deleted() {
        let store = setup();
        let v1 = store.upsert_task("u1", &task_write("t1")).unwrap();
        let mut gone = task_write("t2");
        gone.deleted = true;
        let v2 = store.upsert_task("u1", &gone).unwrap();

        let rows = store.tasks_changed_since("u1", v1).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].client_id, "t2");
        assert!(rows[0].deleted);
        assert_eq!(rows[0].sync_version, v2);

        assert!(store.tasks_changed_since("u1", v2).unwrap().is_empty());
    }

    #[test]
    fn rows_are_scoped_per_user() {
        let store = setup();
        store.upsert_task("u1", &task_write("t1")).unwrap();
        store.upsert_task("u2", &task_write("t1")).unwrap();

        assert_eq!(store.tasks_changed_since("u1", 0).unwrap().len(), 1);
        store.clear_user("u1").unwrap();
        assert!(store.tasks_changed_since("u1", 0).unwrap().is_empty());
        assert_eq!(store.tasks_changed_since("u2", 0).unwrap().len(), 1);
    }

    #[test]
    fn duplicate_usernames_conflict() {
        let store = setup();
        store.create_user("alice", "alice@example.com", "hash").unwrap();
        let err = store
            .create_user("alice", "other@example.com", "hash")
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[test]
    fn expired_sessions_do_not_resolve() {
        let store = setup();
        let user = store.create_user("bob", "bob@example.com", "hash").unwrap();
        store
            .create_session(&user, "fresh", Utc::now() + Duration::hours(1))
            .unwrap();
        store
            .create_session(&user, "stale", Utc::now() - Duration::hours(1))
            .unwrap();

        assert_eq!(store.session_user("fresh").unwrap(), Some(user));
        assert_eq!(store.session_user("stale").unwrap(), None);
        assert_eq!(store.session_user("unknown").unwrap(), None);
    }

    #[test]
    fn magic_links_are_single_use() {
        let store = setup();
        store
            .create_magic_link("carol@example.com", "tok", Utc::now() + Duration::minutes(15))
            .unwrap();

        assert_eq!(store.redeem_magic_link("tok").unwrap(), "carol@example.com");
        assert!(store.redeem_magic_link("tok").is_err());
    }

    #[test]
    fn expired_magic_links_are_rejected() {
        let store = setup();
        store
            .create_magic_link("dan@example.com", "tok", Utc::now() - Duration::minutes(1))
            .unwrap();
        assert!(store.redeem_magic_link("tok").is_err());
    }
}
