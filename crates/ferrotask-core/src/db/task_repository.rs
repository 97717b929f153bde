//! Task repository implementation

use crate::error::{Error, Result};
use crate::models::{Priority, Task, TaskStatus};
use crate::util::now_rfc3339;
use chrono::NaiveDate;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use super::column_timestamp;

/// Trait for task storage operations
pub trait TaskRepository {
    /// Insert a new dirty task
    fn create(&self, task: &Task) -> Result<()>;

    /// Get a task by client id
    fn get(&self, id: &str) -> Result<Option<Task>>;

    /// List non-deleted tasks, optionally scoped to one project
    fn list_active(&self, project_id: Option<&str>) -> Result<Vec<Task>>;

    /// List soft-deleted tasks (the archive view)
    fn list_archived(&self) -> Result<Vec<Task>>;

    /// Replace a task's content; marks the row dirty
    fn update_content(&self, id: &str, content: &str) -> Result<()>;

    /// Change workflow status; done -> process also re-dirties
    fn set_status(&self, id: &str, status: TaskStatus) -> Result<()>;

    /// Change priority; marks the row dirty
    fn set_priority(&self, id: &str, priority: Priority) -> Result<()>;

    /// Set or clear the due date; marks the row dirty
    fn set_due_date(&self, id: &str, due_date: Option<NaiveDate>) -> Result<()>;

    /// Move a task to a different project; marks the row dirty
    fn reassign_project(&self, id: &str, project_id: &str) -> Result<()>;

    /// Soft-delete a task; marks the row dirty
    fn soft_delete(&self, id: &str) -> Result<()>;

    /// Rows awaiting push (`sync_version IS NULL`), oldest edit first
    fn list_dirty(&self) -> Result<Vec<Task>>;

    /// Rows acknowledged above `version`; local filter for UI views
    fn list_since(&self, version: i64) -> Result<Vec<Task>>;

    /// Upsert the server's authoritative row; clears dirty
    fn overwrite_from_server(&self, task: &Task, version: i64) -> Result<()>;

    /// Post-push acknowledgement: keep content, transition dirty -> clean
    fn set_sync_version(&self, id: &str, version: i64) -> Result<()>;

    /// Mark a row dirty with a fresh timestamp, content untouched
    /// (keep-local conflict resolution)
    fn touch(&self, id: &str) -> Result<()>;

    /// Remove every task (force-pull)
    fn clear_all(&self) -> Result<()>;
}

/// `SQLite` implementation of `TaskRepository`
pub struct SqliteTaskRepository<'a> {
    conn: &'a Connection,
}

const TASK_COLUMNS: &str =
    "id, project_id, content, status, priority, due_date, deleted, sync_version, created_at, updated_at";

impl<'a> SqliteTaskRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a task from a database row
    fn parse_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
        let status: String = row.get(3)?;
        let status = status.parse::<TaskStatus>().map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(error))
        })?;
        let priority = Priority::try_from(row.get::<_, i32>(4)?).map_err(|error| {
            rusqlite::Error::FromSqlConversionFailure(4, Type::Integer, Box::new(error))
        })?;
        let due_date = row
            .get::<_, Option<String>>(5)?
            .map(|raw| {
                NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|error| {
                    rusqlite::Error::FromSqlConversionFailure(5, Type::Text, Box::new(error))
                })
            })
            .transpose()?;

        Ok(Task {
            id: row.get(0)?,
            project_id: row.get(1)?,
            content: row.get(2)?,
            status,
            priority,
            due_date,
            deleted: row.get::<_, i32>(6)? != 0,
            sync_version: row.get(7)?,
            created_at: column_timestamp(8, &row.get::<_, String>(8)?)?,
            updated_at: column_timestamp(9, &row.get::<_, String>(9)?)?,
        })
    }

    /// Run a dirtying UPDATE and map zero affected rows to NotFound
    fn dirtying_update(&self, sql: &str, parameters: impl rusqlite::Params, id: &str) -> Result<()> {
        let rows = self.conn.execute(sql, parameters)?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }
}

impl TaskRepository for SqliteTaskRepository<'_> {
    fn create(&self, task: &Task) -> Result<()> {
        self.conn.execute(
            "INSERT INTO tasks (id, project_id, content, status, priority, due_date, deleted, sync_version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                task.id,
                task.project_id,
                task.content,
                task.status.as_str(),
                i32::from(task.priority),
                task.due_date.map(|date| date.to_string()),
                i32::from(task.deleted),
                task.sync_version,
                crate::util::format_rfc3339(task.created_at),
                crate::util::format_rfc3339(task.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Task>> {
        let task = self
            .conn
            .query_row(
                &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                params![id],
                Self::parse_task,
            )
            .optional()?;
        Ok(task)
    }

    fn list_active(&self, project_id: Option<&str>) -> Result<Vec<Task>> {
        let order = "ORDER BY priority ASC, updated_at DESC";
        let (sql, filter) = match project_id {
            Some(project) => (
                format!(
                    "SELECT {TASK_COLUMNS} FROM tasks WHERE deleted = 0 AND project_id = ?1 {order}"
                ),
                Some(project),
            ),
            None => (
                format!("SELECT {TASK_COLUMNS} FROM tasks WHERE deleted = 0 {order}"),
                None,
            ),
        };

        let mut stmt = self.conn.prepare(&sql)?;
        let tasks = match filter {
            Some(project) => stmt
                .query_map(params![project], Self::parse_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
            None => stmt
                .query_map([], Self::parse_task)?
                .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(tasks)
    }

    fn list_archived(&self) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE deleted = 1 ORDER BY updated_at DESC"
        ))?;
        let tasks = stmt
            .query_map([], Self::parse_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    fn update_content(&self, id: &str, content: &str) -> Result<()> {
        self.dirtying_update(
            "UPDATE tasks SET content = ?1, sync_version = NULL, updated_at = ?2
             WHERE id = ?3 AND deleted = 0",
            params![content, now_rfc3339(), id],
            id,
        )
    }

    fn set_status(&self, id: &str, status: TaskStatus) -> Result<()> {
        self.dirtying_update(
            "UPDATE tasks SET status = ?1, sync_version = NULL, updated_at = ?2
             WHERE id = ?3 AND deleted = 0",
            params![status.as_str(), now_rfc3339(), id],
            id,
        )
    }

    fn set_priority(&self, id: &str, priority: Priority) -> Result<()> {
        self.dirtying_update(
            "UPDATE tasks SET priority = ?1, sync_version = NULL, updated_at = ?2
             WHERE id = ?3 AND deleted = 0",
            params![i32::from(priority), now_rfc3339(), id],
            id,
        )
    }

    fn set_due_date(&self, id: &str, due_date: Option<NaiveDate>) -> Result<()> {
        self.dirtying_update(
            "UPDATE tasks SET due_date = ?1, sync_version = NULL, updated_at = ?2
             WHERE id = ?3 AND deleted = 0",
            params![due_date.map(|date| date.to_string()), now_rfc3339(), id],
            id,
        )
    }

    fn reassign_project(&self, id: &str, project_id: &str) -> Result<()> {
        self.dirtying_update(
            "UPDATE tasks SET project_id = ?1, sync_version = NULL, updated_at = ?2
             WHERE id = ?3 AND deleted = 0",
            params![project_id, now_rfc3339(), id],
            id,
        )
    }

    fn soft_delete(&self, id: &str) -> Result<()> {
        self.dirtying_update(
            "UPDATE tasks SET deleted = 1, sync_version = NULL, updated_at = ?1
             WHERE id = ?2 AND deleted = 0",
            params![now_rfc3339(), id],
            id,
        )
    }

    fn list_dirty(&self) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks
             WHERE sync_version IS NULL
             ORDER BY updated_at ASC"
        ))?;
        let tasks = stmt
            .query_map([], Self::parse_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    fn list_since(&self, version: i64) -> Result<Vec<Task>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE sync_version > ?1"
        ))?;
        let tasks = stmt
            .query_map(params![version], Self::parse_task)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tasks)
    }

    fn overwrite_from_server(&self, task: &Task, version: i64) -> Result<()> {
        let now = now_rfc3339();
        self.conn.execute(
            "INSERT INTO tasks (id, project_id, content, status, priority, due_date, deleted, sync_version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 project_id = excluded.project_id,
                 content = excluded.content,
                 status = excluded.status,
                 priority = excluded.priority,
                 due_date = excluded.due_date,
                 deleted = excluded.deleted,
                 sync_version = excluded.sync_version,
                 updated_at = excluded.updated_at",
            params![
                task.id,
                task.project_id,
                task.content,
                task.status.as_str(),
                i32::from(task.priority),
                task.due_date.map(|date| date.to_string()),
                i32::from(task.deleted),
                version,
                now,
            ],
        )?;
        Ok(())
    }

    fn set_sync_version(&self, id: &str, version: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE tasks SET sync_version = ?1 WHERE id = ?2",
            params![version, id],
        )?;
        Ok(())
    }

    fn touch(&self, id: &str) -> Result<()> {
        self.dirtying_update(
            "UPDATE tasks SET sync_version = NULL, updated_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), id],
            id,
        )
    }

    fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM tasks", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let task = Task::new("buy milk", None);
        repo.create(&task).unwrap();

        let fetched = repo.get(&task.id).unwrap().unwrap();
        assert_eq!(fetched.content, "buy milk");
        assert_eq!(fetched.project_id, "inbox");
        assert!(fetched.is_dirty());
    }

    #[test]
    fn test_status_transitions_redirty() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let task = Task::new("do thing", None);
        repo.create(&task).unwrap();
        repo.set_sync_version(&task.id, 3).unwrap();

        repo.set_status(&task.id, TaskStatus::Done).unwrap();
        assert!(repo.get(&task.id).unwrap().unwrap().is_dirty());

        // Undo-done must re-dirty again after an acknowledgement.
        repo.set_sync_version(&task.id, 4).unwrap();
        repo.set_status(&task.id, TaskStatus::Process).unwrap();
        let fetched = repo.get(&task.id).unwrap().unwrap();
        assert_eq!(fetched.status, TaskStatus::Process);
        assert!(fetched.is_dirty());
    }

    #[test]
    fn test_soft_delete_keeps_row() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let task = Task::new("temp", None);
        repo.create(&task).unwrap();
        repo.set_sync_version(&task.id, 1).unwrap();
        repo.soft_delete(&task.id).unwrap();

        let fetched = repo.get(&task.id).unwrap().unwrap();
        assert!(fetched.deleted);
        assert!(fetched.is_dirty());
        assert!(repo.list_active(None).unwrap().is_empty());
        assert_eq!(repo.list_archived().unwrap().len(), 1);
    }

    #[test]
    fn test_list_active_by_project() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        repo.create(&Task::new("inbox task", None)).unwrap();
        repo.create(&Task::new("project task", Some("proj-1"))).unwrap();

        assert_eq!(repo.list_active(None).unwrap().len(), 2);
        assert_eq!(repo.list_active(Some("proj-1")).unwrap().len(), 1);
    }

    #[test]
    fn test_list_dirty_excludes_acknowledged() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let clean = Task::new("clean", None);
        let dirty = Task::new("dirty", None);
        repo.create(&clean).unwrap();
        repo.create(&dirty).unwrap();
        repo.set_sync_version(&clean.id, 9).unwrap();

        let pending = repo.list_dirty().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, dirty.id);
    }

    #[test]
    fn test_list_since_filters_strictly() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let old = Task::new("old", None);
        let new = Task::new("new", None);
        repo.create(&old).unwrap();
        repo.create(&new).unwrap();
        repo.set_sync_version(&old.id, 5).unwrap();
        repo.set_sync_version(&new.id, 9).unwrap();

        let since = repo.list_since(5).unwrap();
        assert_eq!(since.len(), 1);
        assert_eq!(since[0].id, new.id);
        // Dirty rows have no version and never appear.
        repo.create(&Task::new("dirty", None)).unwrap();
        assert_eq!(repo.list_since(0).unwrap().len(), 2);
    }

    #[test]
    fn test_overwrite_from_server_applies_deletion() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let task = Task::new("shared", None);
        repo.create(&task).unwrap();
        repo.set_sync_version(&task.id, 5).unwrap();

        let mut server_row = task.clone();
        server_row.deleted = true;
        repo.overwrite_from_server(&server_row, 6).unwrap();

        let fetched = repo.get(&task.id).unwrap().unwrap();
        assert!(fetched.deleted);
        assert_eq!(fetched.sync_version, Some(6));
    }

    #[test]
    fn test_due_date_round_trip() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());

        let task = Task::new("dated", None);
        repo.create(&task).unwrap();

        let due = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        repo.set_due_date(&task.id, Some(due)).unwrap();
        assert_eq!(repo.get(&task.id).unwrap().unwrap().due_date, Some(due));

        repo.set_due_date(&task.id, None).unwrap();
        assert_eq!(repo.get(&task.id).unwrap().unwrap().due_date, None);
    }

    #[test]
    fn test_mutations_on_missing_task() {
        let db = setup();
        let repo = SqliteTaskRepository::new(db.connection());
        let err = repo.update_content("missing", "x").unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
