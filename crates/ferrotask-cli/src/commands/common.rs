use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use ferrotask_core::db::{
    Database, ProjectRepository, SqliteProjectRepository, SqliteTaskRepository, TaskRepository,
};
use ferrotask_core::models::{Priority, Project, Task, TaskStatus};
use rusqlite::params;
use serde::Serialize;

use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct TaskListItem {
    pub id: String,
    pub project_id: String,
    pub content: String,
    pub status: TaskStatus,
    pub priority: i32,
    pub due_date: Option<String>,
    pub dirty: bool,
}

#[derive(Debug, Serialize)]
pub struct ProjectListItem {
    pub id: String,
    pub slug: String,
    pub name: String,
    pub color: String,
    pub dirty: bool,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| std::env::var_os("FERROTASK_DB_PATH").map(PathBuf::from))
        .unwrap_or_else(|| data_dir().join("tasks.db"))
}

pub fn resolve_sync_config_path(cli_path: Option<PathBuf>) -> PathBuf {
    cli_path
        .or_else(|| std::env::var_os("FERROTASK_SYNC_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| data_dir().join("sync.json"))
}

fn data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ferrotask")
}

pub fn open_database(path: &Path) -> Result<Database, CliError> {
    Ok(Database::open(path)?)
}

pub fn resolve_task_content(parts: &[String]) -> Result<String, CliError> {
    let joined = parts.join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        return Err(CliError::EmptyContent);
    }
    Ok(trimmed.to_string())
}

pub fn parse_priority(raw: i32) -> Result<Priority, CliError> {
    Priority::try_from(raw).map_err(|_| CliError::InvalidPriority(raw))
}

pub fn parse_due_date(raw: &str) -> Result<NaiveDate, CliError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| CliError::InvalidDueDate(raw.to_string()))
}

/// Resolve a task by full id or unique id prefix.
pub fn resolve_task(db: &Database, query: &str) -> Result<Task, CliError> {
    let repo = SqliteTaskRepository::new(db.connection());
    if let Some(task) = repo.get(query)? {
        return Ok(task);
    }

    let mut stmt = db.connection().prepare(
        "SELECT id FROM tasks
         WHERE deleted = 0 AND id LIKE ?1
         ORDER BY updated_at DESC
         LIMIT 3",
    )?;
    let matching_ids = stmt
        .query_map(params![format!("{query}%")], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    match matching_ids.as_slice() {
        [] => Err(CliError::TaskNotFound(query.to_string())),
        [id] => repo
            .get(id)?
            .ok_or_else(|| CliError::TaskNotFound(query.to_string())),
        candidates => {
            let options = candidates
                .iter()
                .map(|id| id.chars().take(8).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousTaskId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

/// Resolve a project by slug.
pub fn resolve_project(db: &Database, slug: &str) -> Result<Project, CliError> {
    SqliteProjectRepository::new(db.connection())
        .find_by_slug(slug)?
        .filter(|project| !project.deleted)
        .ok_or_else(|| CliError::ProjectNotFound(slug.to_string()))
}

pub fn format_task_lines(tasks: &[Task]) -> Vec<String> {
    tasks
        .iter()
        .map(|task| {
            let short_id = task.id.chars().take(8).collect::<String>();
            let status = status_mark(task.status);
            let priority = i32::from(task.priority);
            let due = task
                .due_date
                .map(|date| format!("  due {date}"))
                .unwrap_or_default();
            let dirty = if task.is_dirty() { " *" } else { "" };
            format!("{short_id}  {status} p{priority}  {}{due}{dirty}", task.content)
        })
        .collect()
}

pub const fn status_mark(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Process => "[ ]",
        TaskStatus::Done => "[x]",
        TaskStatus::Ignore => "[-]",
    }
}

pub fn task_to_item(task: &Task) -> TaskListItem {
    TaskListItem {
        id: task.id.clone(),
        project_id: task.project_id.clone(),
        content: task.content.clone(),
        status: task.status,
        priority: task.priority.into(),
        due_date: task.due_date.map(|date| date.to_string()),
        dirty: task.is_dirty(),
    }
}

pub fn project_to_item(project: &Project) -> ProjectListItem {
    ProjectListItem {
        id: project.id.clone(),
        slug: project.slug.clone(),
        name: project.name.clone(),
        color: project.color.clone(),
        dirty: project.is_dirty(),
    }
}

/// y/N confirmation on stdin. Anything but an explicit yes declines.
pub fn confirm(prompt: &str) -> Result<bool, CliError> {
    print!("{prompt} [y/N]: ");
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer == "y" || answer == "yes")
}
