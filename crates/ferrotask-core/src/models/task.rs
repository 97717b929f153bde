//! Task model

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::INBOX_PROJECT_ID;

/// Workflow state of a task
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Open and being worked on
    #[default]
    Process,
    /// Completed
    Done,
    /// Parked without completing
    Ignore,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::Done => "done",
            Self::Ignore => "ignore",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "process" => Ok(Self::Process),
            "done" => Ok(Self::Done),
            "ignore" => Ok(Self::Ignore),
            other => Err(crate::Error::InvalidInput(format!(
                "unknown task status '{other}'"
            ))),
        }
    }
}

/// Task priority, 1 (urgent) through 4 (low)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum Priority {
    Urgent = 1,
    High = 2,
    Medium = 3,
    #[default]
    Low = 4,
}

impl TryFrom<i32> for Priority {
    type Error = crate::Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Urgent),
            2 => Ok(Self::High),
            3 => Ok(Self::Medium),
            4 => Ok(Self::Low),
            other => Err(crate::Error::InvalidInput(format!(
                "priority must be 1-4, got {other}"
            ))),
        }
    }
}

impl From<Priority> for i32 {
    fn from(value: Priority) -> Self {
        value as i32
    }
}

/// A single todo item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Client-chosen stable identifier, shared across replicas
    pub id: String,
    /// Parent project; falls back to the inbox
    pub project_id: String,
    pub content: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: Option<NaiveDate>,
    /// Soft-delete flag; deleted tasks keep syncing
    pub deleted: bool,
    /// Server-assigned version; `None` marks the row dirty (needs push)
    pub sync_version: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Create a new dirty task in the given project (or the inbox).
    #[must_use]
    pub fn new(content: impl Into<String>, project_id: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            project_id: project_id.unwrap_or(INBOX_PROJECT_ID).to_string(),
            content: content.into(),
            status: TaskStatus::Process,
            priority: Priority::Low,
            due_date: None,
            deleted: false,
            sync_version: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether local mutations are awaiting a push acknowledgement.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.sync_version.is_none()
    }

    /// Due today or earlier.
    #[must_use]
    pub fn is_due(&self) -> bool {
        self.due_date
            .is_some_and(|due| due <= Utc::now().date_naive())
    }

    /// Past its due date.
    #[must_use]
    pub fn is_overdue(&self) -> bool {
        self.due_date
            .is_some_and(|due| due < Utc::now().date_naive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_task_defaults() {
        let task = Task::new("buy milk", None);
        assert_eq!(task.project_id, INBOX_PROJECT_ID);
        assert_eq!(task.status, TaskStatus::Process);
        assert_eq!(task.priority, Priority::Low);
        assert!(task.is_dirty());
    }

    #[test]
    fn status_round_trips_through_str() {
        for status in [TaskStatus::Process, TaskStatus::Done, TaskStatus::Ignore] {
            assert_eq!(status.as_str().parse::<TaskStatus>().unwrap(), status);
        }
        assert!("weird".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn status_serde_uses_lowercase() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::Done).unwrap(),
            "\"done\""
        );
    }

    #[test]
    fn priority_rejects_out_of_range() {
        assert!(Priority::try_from(0).is_err());
        assert!(Priority::try_from(5).is_err());
        assert_eq!(Priority::try_from(1).unwrap(), Priority::Urgent);
    }

    #[test]
    fn priority_serializes_as_number() {
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "2");
        assert_eq!(serde_json::from_str::<Priority>("4").unwrap(), Priority::Low);
    }

    #[test]
    fn due_date_checks() {
        let mut task = Task::new("x", None);
        assert!(!task.is_due());

        task.due_date = Some(Utc::now().date_naive());
        assert!(task.is_due());
        assert!(!task.is_overdue());

        task.due_date = Some(Utc::now().date_naive() - Duration::days(1));
        assert!(task.is_overdue());
    }
}
