use std::path::Path;

use ferrotask_core::db::{SqliteTaskRepository, TaskRepository};
use ferrotask_core::models::TaskStatus;

use crate::commands::common::{open_database, resolve_task};
use crate::error::CliError;

pub fn run_done(id: &str, undo: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let task = resolve_task(&db, id)?;

    let status = if undo {
        TaskStatus::Process
    } else {
        TaskStatus::Done
    };
    SqliteTaskRepository::new(db.connection()).set_status(&task.id, status)?;

    if undo {
        println!("Reopened: {}", task.content);
    } else {
        println!("Done: {}", task.content);
    }
    Ok(())
}
