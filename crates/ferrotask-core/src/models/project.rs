//! Project model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::slugify;

/// Stable id of the synthetic fallback project every replica presents.
pub const INBOX_PROJECT_ID: &str = "inbox";

const DEFAULT_COLOR: &str = "#4ECDC4";
const INBOX_COLOR: &str = "#6C757D";

/// A collection of tasks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Client-chosen stable identifier, shared across replicas
    pub id: String,
    /// Human-readable form derived from the name, unique per user
    pub slug: String,
    pub name: String,
    pub color: String,
    /// Soft-delete flag; deleted projects keep syncing
    pub deleted: bool,
    /// Server-assigned version; `None` marks the row dirty (needs push)
    pub sync_version: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create a new dirty project with a fresh client id and derived slug.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            slug: slugify(&name),
            name,
            color: DEFAULT_COLOR.to_string(),
            deleted: false,
            sync_version: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The inbox project seeded into every replica.
    ///
    /// Seeding is not a local edit: the row starts at version 0, already
    /// considered synced.
    #[must_use]
    pub fn inbox() -> Self {
        let now = Utc::now();
        Self {
            id: INBOX_PROJECT_ID.to_string(),
            slug: INBOX_PROJECT_ID.to_string(),
            name: "Inbox".to_string(),
            color: INBOX_COLOR.to_string(),
            deleted: false,
            sync_version: Some(0),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether local mutations are awaiting a push acknowledgement.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.sync_version.is_none()
    }

    /// The inbox may never be deleted.
    #[must_use]
    pub fn is_inbox(&self) -> bool {
        self.id == INBOX_PROJECT_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_project_is_dirty() {
        let project = Project::new("Weekend Errands");
        assert!(project.is_dirty());
        assert_eq!(project.slug, "weekend-errands");
        assert!(!project.deleted);
    }

    #[test]
    fn inbox_starts_synced() {
        let inbox = Project::inbox();
        assert!(!inbox.is_dirty());
        assert_eq!(inbox.sync_version, Some(0));
        assert!(inbox.is_inbox());
    }

    #[test]
    fn project_ids_are_unique() {
        assert_ne!(Project::new("a").id, Project::new("a").id);
    }
}
