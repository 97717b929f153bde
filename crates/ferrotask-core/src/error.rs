//! Error types for ferrotask-core

use thiserror::Error;

/// Result type alias using ferrotask-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ferrotask-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// HTTP transport error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (settings file, paths)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No stored session; the operation requires a login
    #[error("Not logged in")]
    NotLoggedIn,

    /// The server rejected the stored session token
    #[error("Session rejected by server; please log in again")]
    Unauthorized,

    /// Server returned a non-success status
    #[error("Server error: {0}")]
    Server(String),

    /// Project still has active tasks and cannot be deleted
    #[error("Project '{0}' still has active tasks; reassign or complete them first")]
    ProjectHasActiveTasks(String),

    /// Project slug already taken by another project
    #[error("Project slug '{0}' already exists")]
    SlugExists(String),
}
