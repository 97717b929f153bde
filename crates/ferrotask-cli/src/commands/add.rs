use std::path::Path;

use ferrotask_core::db::{SqliteTaskRepository, TaskRepository};
use ferrotask_core::models::Task;

use crate::commands::common::{
    open_database, parse_due_date, parse_priority, resolve_project, resolve_task_content,
};
use crate::error::CliError;

pub fn run_add(
    content_parts: &[String],
    project_slug: Option<&str>,
    priority: Option<i32>,
    due: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let content = resolve_task_content(content_parts)?;

    let db = open_database(db_path)?;
    let project_id = match project_slug {
        Some(slug) => resolve_project(&db, slug)?.id,
        None => ferrotask_core::models::INBOX_PROJECT_ID.to_string(),
    };

    let mut task = Task::new(content, Some(&project_id));
    if let Some(raw) = priority {
        task.priority = parse_priority(raw)?;
    }
    if let Some(raw) = due {
        task.due_date = Some(parse_due_date(raw)?);
    }

    SqliteTaskRepository::new(db.connection()).create(&task)?;
    println!("{}", task.id);
    Ok(())
}
