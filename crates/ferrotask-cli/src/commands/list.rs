use std::path::Path;

use ferrotask_core::db::{SqliteTaskRepository, TaskRepository};

use crate::commands::common::{
    format_task_lines, open_database, resolve_project, task_to_item, TaskListItem,
};
use crate::error::CliError;

pub fn run_list(
    project_slug: Option<&str>,
    archived: bool,
    as_json: bool,
    db_path: &Path,
) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let repo = SqliteTaskRepository::new(db.connection());

    let tasks = if archived {
        repo.list_archived()?
    } else {
        let project_id = project_slug
            .map(|slug| resolve_project(&db, slug).map(|project| project.id))
            .transpose()?;
        repo.list_active(project_id.as_deref())?
    };

    if as_json {
        let items = tasks.iter().map(task_to_item).collect::<Vec<TaskListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    if tasks.is_empty() {
        println!("No tasks.");
        return Ok(());
    }
    for line in format_task_lines(&tasks) {
        println!("{line}");
    }
    Ok(())
}
