use std::path::Path;

use ferrotask_core::db::{ProjectRepository, SqliteProjectRepository};
use ferrotask_core::models::Project;

use crate::commands::common::{open_database, project_to_item, resolve_project, ProjectListItem};
use crate::error::CliError;

pub fn run_project_add(name_parts: &[String], db_path: &Path) -> Result<(), CliError> {
    let name = name_parts.join(" ");
    let name = name.trim();
    if name.is_empty() {
        return Err(CliError::EmptyProjectName);
    }

    let db = open_database(db_path)?;
    let repo = SqliteProjectRepository::new(db.connection());

    let mut project = Project::new(name);
    project.slug = repo.unique_slug(name)?;
    repo.create(&project)?;

    println!("{}  {}", project.slug, project.id);
    Ok(())
}

pub fn run_project_list(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let projects = SqliteProjectRepository::new(db.connection()).list(false)?;

    if as_json {
        let items = projects
            .iter()
            .map(project_to_item)
            .collect::<Vec<ProjectListItem>>();
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for project in &projects {
        let dirty = if project.is_dirty() { " *" } else { "" };
        println!("{:<20}  {}{dirty}", project.slug, project.name);
    }
    Ok(())
}

pub fn run_project_delete(slug: &str, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let project = resolve_project(&db, slug)?;
    SqliteProjectRepository::new(db.connection()).soft_delete(&project.id)?;
    println!("Deleted project: {}", project.name);
    Ok(())
}
