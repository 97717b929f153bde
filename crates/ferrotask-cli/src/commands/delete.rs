use std::path::Path;

use ferrotask_core::db::{SqliteTaskRepository, TaskRepository};

use crate::commands::common::{open_database, resolve_task};
use crate::error::CliError;

pub fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let task = resolve_task(&db, id)?;
    SqliteTaskRepository::new(db.connection()).soft_delete(&task.id)?;
    println!("Deleted: {}", task.content);
    Ok(())
}
