//! Ferrotask CLI - the terminal replica
//!
//! Local writes land in the replica's own store and are marked dirty;
//! `ferro sync` pushes them to the relay and pulls everything new.

mod cli;
mod commands;
mod error;
#[cfg(test)]
mod tests;

use clap::{CommandFactory, Parser};

use crate::cli::{Cli, Commands, ProjectCommands, SyncCommands};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("ferrotask=warn".parse().expect("valid directive")),
        )
        .init();

    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(error.exit_code());
    }
}

async fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let db_path = commands::common::resolve_db_path(cli.db_path);
    let sync_config = commands::common::resolve_sync_config_path(cli.sync_config);

    match cli.command {
        Some(Commands::Add {
            content,
            project,
            priority,
            due,
        }) => {
            commands::add::run_add(&content, project.as_deref(), priority, due.as_deref(), &db_path)?;
        }
        Some(Commands::List {
            project,
            archived,
            json,
        }) => {
            commands::list::run_list(project.as_deref(), archived, json, &db_path)?;
        }
        Some(Commands::Done { id, undo }) => commands::done::run_done(&id, undo, &db_path)?,
        Some(Commands::Delete { id }) => commands::delete::run_delete(&id, &db_path)?,
        Some(Commands::Project { command }) => match command {
            ProjectCommands::Add { name } => commands::project::run_project_add(&name, &db_path)?,
            ProjectCommands::List { json } => commands::project::run_project_list(json, &db_path)?,
            ProjectCommands::Delete { slug } => {
                commands::project::run_project_delete(&slug, &db_path)?;
            }
        },
        Some(Commands::Sync { command }) => match command {
            None => commands::sync::run_sync(&db_path, &sync_config).await?,
            Some(SyncCommands::Register {
                username,
                email,
                password,
                server,
            }) => {
                commands::auth_cmd::run_register(
                    &username,
                    &email,
                    &password,
                    server.as_deref(),
                    &sync_config,
                )
                .await?;
            }
            Some(SyncCommands::Login {
                username,
                password,
                server,
            }) => {
                commands::auth_cmd::run_login(&username, &password, server.as_deref(), &sync_config)
                    .await?;
            }
            Some(SyncCommands::Logout) => commands::auth_cmd::run_logout(&sync_config).await?,
            Some(SyncCommands::Status) => commands::sync::run_status(&sync_config)?,
            Some(SyncCommands::Pull { yes }) => {
                commands::sync::run_force_pull(yes, &db_path, &sync_config).await?;
            }
            Some(SyncCommands::Push { yes }) => {
                commands::sync::run_force_push(yes, &db_path, &sync_config).await?;
            }
        },
        None => {
            if cli.task.is_empty() {
                Cli::command().print_help().map_err(CliError::Io)?;
                println!();
            } else {
                commands::add::run_add(&cli.task, None, None, None, &db_path)?;
            }
        }
    }

    Ok(())
}
