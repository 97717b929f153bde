use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ferro")]
#[command(about = "Todo lists that follow you across devices")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Optional path to the local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to the sync settings file
    #[arg(long, global = true, value_name = "PATH")]
    pub sync_config: Option<PathBuf>,

    /// Quick capture: ferro "pick up groceries"
    #[arg(trailing_var_arg = true)]
    pub task: Vec<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new task
    #[command(alias = "new")]
    Add {
        /// Task content
        content: Vec<String>,
        /// Project slug to file the task under (default: inbox)
        #[arg(long, value_name = "SLUG")]
        project: Option<String>,
        /// Priority 1 (urgent) to 4 (low)
        #[arg(short, long)]
        priority: Option<i32>,
        /// Due date, YYYY-MM-DD
        #[arg(long, value_name = "DATE")]
        due: Option<String>,
    },
    /// List tasks
    List {
        /// Filter by project slug
        #[arg(long, value_name = "SLUG")]
        project: Option<String>,
        /// Include soft-deleted tasks
        #[arg(long)]
        archived: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Mark a task done
    Done {
        /// Task ID or unique ID prefix
        id: String,
        /// Reopen instead (undo done)
        #[arg(long)]
        undo: bool,
    },
    /// Soft-delete a task
    Delete {
        /// Task ID or unique ID prefix
        id: String,
    },
    /// Manage projects
    Project {
        #[command(subcommand)]
        command: ProjectCommands,
    },
    /// Sync with the relay server
    Sync {
        #[command(subcommand)]
        command: Option<SyncCommands>,
    },
}

#[derive(Subcommand)]
pub enum ProjectCommands {
    /// Create a project
    Add {
        /// Project name
        name: Vec<String>,
    },
    /// List projects
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Soft-delete a project (must have no active tasks)
    Delete {
        /// Project slug
        slug: String,
    },
}

#[derive(Subcommand)]
pub enum SyncCommands {
    /// Create an account on the relay
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        /// Relay server URL
        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },
    /// Log in to an existing account
    Login {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        /// Relay server URL
        #[arg(long, value_name = "URL")]
        server: Option<String>,
    },
    /// Log out and clear stored credentials
    Logout,
    /// Show sync status
    Status,
    /// Discard local state and pull everything from the server
    Pull {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Discard server state and push everything local
    Push {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}
