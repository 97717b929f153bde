//! Project repository implementation

use crate::error::{Error, Result};
use crate::models::Project;
use crate::util::{now_rfc3339, slugify};
use rusqlite::{params, Connection, OptionalExtension};

use super::column_timestamp;

/// Trait for project storage operations
pub trait ProjectRepository {
    /// Insert a new dirty project
    fn create(&self, project: &Project) -> Result<()>;

    /// Get a project by client id
    fn get(&self, id: &str) -> Result<Option<Project>>;

    /// Get a project by slug
    fn find_by_slug(&self, slug: &str) -> Result<Option<Project>>;

    /// List projects, name order; optionally include soft-deleted rows
    fn list(&self, include_deleted: bool) -> Result<Vec<Project>>;

    /// Rename a project, re-deriving its slug; marks the row dirty
    fn rename(&self, id: &str, name: &str) -> Result<()>;

    /// Change the display color; marks the row dirty
    fn set_color(&self, id: &str, color: &str) -> Result<()>;

    /// Soft-delete a project; fails while active tasks still reference it
    fn soft_delete(&self, id: &str) -> Result<()>;

    /// Rows awaiting push (`sync_version IS NULL`), oldest edit first
    fn list_dirty(&self) -> Result<Vec<Project>>;

    /// Rows acknowledged above `version`; local filter for UI views
    fn list_since(&self, version: i64) -> Result<Vec<Project>>;

    /// Upsert the server's authoritative row; clears dirty
    fn overwrite_from_server(&self, project: &Project, version: i64) -> Result<()>;

    /// Post-push acknowledgement: keep content, transition dirty -> clean
    fn set_sync_version(&self, id: &str, version: i64) -> Result<()>;

    /// Mark a row dirty with a fresh timestamp, content untouched
    /// (keep-local conflict resolution)
    fn touch(&self, id: &str) -> Result<()>;

    /// Remove every project (force-pull); the inbox is re-seeded
    fn clear_all(&self) -> Result<()>;

    /// Derive a slug from `name` that no existing project uses
    fn unique_slug(&self, name: &str) -> Result<String>;
}

/// `SQLite` implementation of `ProjectRepository`
pub struct SqliteProjectRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteProjectRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a project from a database row
    fn parse_project(row: &rusqlite::Row<'_>) -> rusqlite::Result<Project> {
        Ok(Project {
            id: row.get(0)?,
            slug: row.get(1)?,
            name: row.get(2)?,
            color: row.get(3)?,
            deleted: row.get::<_, i32>(4)? != 0,
            sync_version: row.get(5)?,
            created_at: column_timestamp(6, &row.get::<_, String>(6)?)?,
            updated_at: column_timestamp(7, &row.get::<_, String>(7)?)?,
        })
    }

    fn active_task_count(&self, project_id: &str) -> Result<i64> {
        let count = self.conn.query_row(
            "SELECT COUNT(*) FROM tasks
             WHERE project_id = ?1 AND deleted = 0 AND status != 'done'",
            params![project_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

const PROJECT_COLUMNS: &str =
    "id, slug, name, color, deleted, sync_version, created_at, updated_at";

impl ProjectRepository for SqliteProjectRepository<'_> {
    fn create(&self, project: &Project) -> Result<()> {
        if self.find_by_slug(&project.slug)?.is_some() {
            return Err(Error::SlugExists(project.slug.clone()));
        }

        self.conn.execute(
            "INSERT INTO projects (id, slug, name, color, deleted, sync_version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                project.id,
                project.slug,
                project.name,
                project.color,
                i32::from(project.deleted),
                project.sync_version,
                crate::util::format_rfc3339(project.created_at),
                crate::util::format_rfc3339(project.updated_at),
            ],
        )?;
        Ok(())
    }

    fn get(&self, id: &str) -> Result<Option<Project>> {
        let project = self
            .conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
                params![id],
                Self::parse_project,
            )
            .optional()?;
        Ok(project)
    }

    fn find_by_slug(&self, slug: &str) -> Result<Option<Project>> {
        let project = self
            .conn
            .query_row(
                &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE slug = ?1"),
                params![slug],
                Self::parse_project,
            )
            .optional()?;
        Ok(project)
    }

    fn list(&self, include_deleted: bool) -> Result<Vec<Project>> {
        let sql = if include_deleted {
            format!("SELECT {PROJECT_COLUMNS} FROM projects ORDER BY name")
        } else {
            format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE deleted = 0 ORDER BY name")
        };
        let mut stmt = self.conn.prepare(&sql)?;
        let projects = stmt
            .query_map([], Self::parse_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    fn rename(&self, id: &str, name: &str) -> Result<()> {
        let slug = self.unique_slug(name)?;
        let rows = self.conn.execute(
            "UPDATE projects
             SET name = ?1, slug = ?2, sync_version = NULL, updated_at = ?3
             WHERE id = ?4 AND deleted = 0",
            params![name, slug, now_rfc3339(), id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn set_color(&self, id: &str, color: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE projects
             SET color = ?1, sync_version = NULL, updated_at = ?2
             WHERE id = ?3 AND deleted = 0",
            params![color, now_rfc3339(), id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn soft_delete(&self, id: &str) -> Result<()> {
        let Some(project) = self.get(id)? else {
            return Err(Error::NotFound(id.to_string()));
        };
        if project.is_inbox() {
            return Err(Error::InvalidInput(
                "the inbox project cannot be deleted".to_string(),
            ));
        }
        if self.active_task_count(id)? > 0 {
            return Err(Error::ProjectHasActiveTasks(project.name));
        }

        self.conn.execute(
            "UPDATE projects
             SET deleted = 1, sync_version = NULL, updated_at = ?1
             WHERE id = ?2",
            params![now_rfc3339(), id],
        )?;
        Ok(())
    }

    fn list_dirty(&self) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects
             WHERE sync_version IS NULL
             ORDER BY updated_at ASC"
        ))?;
        let projects = stmt
            .query_map([], Self::parse_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    fn list_since(&self, version: i64) -> Result<Vec<Project>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects WHERE sync_version > ?1"
        ))?;
        let projects = stmt
            .query_map(params![version], Self::parse_project)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(projects)
    }

    fn overwrite_from_server(&self, project: &Project, version: i64) -> Result<()> {
        let now = now_rfc3339();
        self.conn.execute(
            "INSERT INTO projects (id, slug, name, color, deleted, sync_version, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(id) DO UPDATE SET
                 slug = excluded.slug,
                 name = excluded.name,
                 color = excluded.color,
                 deleted = excluded.deleted,
                 sync_version = excluded.sync_version,
                 updated_at = excluded.updated_at",
            params![
                project.id,
                project.slug,
                project.name,
                project.color,
                i32::from(project.deleted),
                version,
                now,
            ],
        )?;
        Ok(())
    }

    fn set_sync_version(&self, id: &str, version: i64) -> Result<()> {
        self.conn.execute(
            "UPDATE projects SET sync_version = ?1 WHERE id = ?2",
            params![version, id],
        )?;
        Ok(())
    }

    fn touch(&self, id: &str) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE projects SET sync_version = NULL, updated_at = ?1 WHERE id = ?2",
            params![now_rfc3339(), id],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM projects", [])?;
        let now = now_rfc3339();
        self.conn.execute(
            "INSERT OR IGNORE INTO projects (id, slug, name, color, deleted, sync_version, created_at, updated_at)
             VALUES ('inbox', 'inbox', 'Inbox', '#6C757D', 0, 0, ?1, ?1)",
            params![now],
        )?;
        Ok(())
    }

    fn unique_slug(&self, name: &str) -> Result<String> {
        let base = slugify(name);
        if self.find_by_slug(&base)?.is_none() {
            return Ok(base);
        }
        for counter in 2.. {
            let candidate = format!("{base}-{counter}");
            if self.find_by_slug(&candidate)?.is_none() {
                return Ok(candidate);
            }
        }
        unreachable!("slug counter space exhausted")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{Database, SqliteTaskRepository, TaskRepository};
    use crate::models::{Task, TaskStatus};

    fn setup() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_create_and_get() {
        let db = setup();
        let repo = SqliteProjectRepository::new(db.connection());

        let project = Project::new("Weekend Errands");
        repo.create(&project).unwrap();

        let fetched = repo.get(&project.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Weekend Errands");
        assert_eq!(fetched.slug, "weekend-errands");
        assert!(fetched.is_dirty());
    }

    #[test]
    fn test_create_rejects_duplicate_slug() {
        let db = setup();
        let repo = SqliteProjectRepository::new(db.connection());

        repo.create(&Project::new("Work")).unwrap();
        let err = repo.create(&Project::new("Work")).unwrap_err();
        assert!(matches!(err, Error::SlugExists(_)));
    }

    #[test]
    fn test_unique_slug_appends_counter() {
        let db = setup();
        let repo = SqliteProjectRepository::new(db.connection());

        repo.create(&Project::new("Work")).unwrap();
        assert_eq!(repo.unique_slug("Work").unwrap(), "work-2");
    }

    #[test]
    fn test_rename_redirties() {
        let db = setup();
        let repo = SqliteProjectRepository::new(db.connection());

        let project = Project::new("Old");
        repo.create(&project).unwrap();
        repo.set_sync_version(&project.id, 5).unwrap();

        repo.rename(&project.id, "New").unwrap();
        let fetched = repo.get(&project.id).unwrap().unwrap();
        assert_eq!(fetched.name, "New");
        assert_eq!(fetched.slug, "new");
        assert!(fetched.is_dirty());
    }

    #[test]
    fn test_soft_delete_refused_with_active_tasks() {
        let db = setup();
        let projects = SqliteProjectRepository::new(db.connection());
        let tasks = SqliteTaskRepository::new(db.connection());

        let project = Project::new("Busy");
        projects.create(&project).unwrap();
        let task = Task::new("pending work", Some(&project.id));
        tasks.create(&task).unwrap();

        let err = projects.soft_delete(&project.id).unwrap_err();
        assert!(matches!(err, Error::ProjectHasActiveTasks(_)));

        // Completing the task unblocks the delete.
        tasks.set_status(&task.id, TaskStatus::Done).unwrap();
        projects.soft_delete(&project.id).unwrap();

        let fetched = projects.get(&project.id).unwrap().unwrap();
        assert!(fetched.deleted);
        assert!(fetched.is_dirty());
    }

    #[test]
    fn test_inbox_is_not_deletable() {
        let db = setup();
        let repo = SqliteProjectRepository::new(db.connection());
        assert!(repo.soft_delete("inbox").is_err());
    }

    #[test]
    fn test_list_dirty_ordering() {
        let db = setup();
        let repo = SqliteProjectRepository::new(db.connection());

        let mut first = Project::new("First");
        first.updated_at = crate::util::parse_rfc3339("2025-01-01T10:00:00Z").unwrap();
        let mut second = Project::new("Second");
        second.updated_at = crate::util::parse_rfc3339("2025-01-02T10:00:00Z").unwrap();

        repo.create(&second).unwrap();
        repo.create(&first).unwrap();

        let dirty = repo.list_dirty().unwrap();
        assert_eq!(dirty.len(), 2);
        assert_eq!(dirty[0].name, "First");
        // Inbox is seeded at version 0 and must not show up as dirty.
        assert!(dirty.iter().all(|project| !project.is_inbox()));
    }

    #[test]
    fn test_overwrite_from_server_clears_dirty() {
        let db = setup();
        let repo = SqliteProjectRepository::new(db.connection());

        let project = Project::new("Local");
        repo.create(&project).unwrap();

        let mut server_row = project.clone();
        server_row.name = "Server".to_string();
        server_row.slug = "server".to_string();
        repo.overwrite_from_server(&server_row, 42).unwrap();

        let fetched = repo.get(&project.id).unwrap().unwrap();
        assert_eq!(fetched.name, "Server");
        assert_eq!(fetched.sync_version, Some(42));
    }

    #[test]
    fn test_overwrite_from_server_inserts_missing() {
        let db = setup();
        let repo = SqliteProjectRepository::new(db.connection());

        let remote = Project::new("Remote Only");
        repo.overwrite_from_server(&remote, 7).unwrap();

        let fetched = repo.get(&remote.id).unwrap().unwrap();
        assert_eq!(fetched.sync_version, Some(7));
        assert!(!fetched.is_dirty());
    }

    #[test]
    fn test_clear_all_reseeds_inbox() {
        let db = setup();
        let repo = SqliteProjectRepository::new(db.connection());

        repo.create(&Project::new("Doomed")).unwrap();
        repo.clear_all().unwrap();

        let remaining = repo.list(true).unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].is_inbox());
    }
}
