use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] ferrotask_core::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No task content provided")]
    EmptyContent,
    #[error("No project name provided")]
    EmptyProjectName,
    #[error("Task not found for id/prefix: {0}")]
    TaskNotFound(String),
    #[error("{0}")]
    AmbiguousTaskId(String),
    #[error("Project not found: {0}")]
    ProjectNotFound(String),
    #[error("Invalid due date '{0}'; expected YYYY-MM-DD")]
    InvalidDueDate(String),
    #[error("Invalid priority '{0}'; expected 1-4")]
    InvalidPriority(i32),
    #[error("Not logged in. Run `ferro sync login` or `ferro sync register` first.")]
    NotLoggedIn,
    #[error("aborted")]
    Aborted,
}

impl CliError {
    /// Process exit code: 0 success, 1 transport or auth failure, 2 user
    /// aborted confirmation.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Aborted => 2,
            _ => 1,
        }
    }
}
