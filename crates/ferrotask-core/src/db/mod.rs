//! Local replica database layer

mod connection;
mod migrations;
mod project_repository;
mod task_repository;

pub use connection::Database;
pub use project_repository::{ProjectRepository, SqliteProjectRepository};
pub use task_repository::{SqliteTaskRepository, TaskRepository};

use chrono::{DateTime, Utc};
use rusqlite::types::Type;

/// Parse an RFC 3339 TEXT column into a UTC timestamp.
pub(crate) fn column_timestamp(index: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(error)))
}
