//! Conflict resolution
//!
//! The sync client surfaces conflicts; this queue is where user intent
//! disambiguates them. Keep-local re-dirties the row with a fresh
//! timestamp so the next push wins the server's timestamp comparison;
//! keep-server overwrites the row with the server's copy; ignore leaves
//! the row dirty to re-conflict on the next push.

use std::collections::VecDeque;

use crate::db::{Database, ProjectRepository, SqliteProjectRepository, SqliteTaskRepository, TaskRepository};
use crate::error::{Error, Result};
use crate::sync::wire::{ConflictItem, ItemKind};

/// What the user chose for one conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictChoice {
    /// Keep the local value; push it again
    KeepLocal,
    /// Take the server's value; discard the local edit
    KeepServer,
    /// Decide later; the row stays dirty
    Ignore,
}

/// Result of resolving one queued conflict
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolutionOutcome {
    /// The queue is now empty; the caller should request a merge-sync to
    /// flush any keep-local rewrites
    pub drained: bool,
    /// This resolution re-dirtied the local row
    pub rewrote_local: bool,
}

/// FIFO queue of conflicts awaiting a user decision
#[derive(Default)]
pub struct ConflictResolver {
    queue: VecDeque<ConflictItem>,
}

impl ConflictResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append freshly detected conflicts.
    pub fn enqueue(&mut self, conflicts: impl IntoIterator<Item = ConflictItem>) {
        self.queue.extend(conflicts);
    }

    /// The conflict currently awaiting a decision.
    #[must_use]
    pub fn current(&self) -> Option<&ConflictItem> {
        self.queue.front()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Resolve the conflict at the head of the queue and advance.
    pub fn resolve_current(
        &mut self,
        db: &Database,
        choice: ConflictChoice,
    ) -> Result<ResolutionOutcome> {
        let conflict = self
            .queue
            .pop_front()
            .ok_or_else(|| Error::InvalidInput("no conflict to resolve".to_string()))?;

        let rewrote_local = match choice {
            ConflictChoice::KeepLocal => {
                Self::keep_local(db, &conflict)?;
                true
            }
            ConflictChoice::KeepServer => {
                Self::keep_server(db, conflict)?;
                false
            }
            ConflictChoice::Ignore => false,
        };

        Ok(ResolutionOutcome {
            drained: self.queue.is_empty(),
            rewrote_local,
        })
    }

    fn keep_local(db: &Database, conflict: &ConflictItem) -> Result<()> {
        match conflict.kind {
            ItemKind::Project => {
                SqliteProjectRepository::new(db.connection()).touch(&conflict.client_id)
            }
            ItemKind::Task => SqliteTaskRepository::new(db.connection()).touch(&conflict.client_id),
            ItemKind::Unknown => Err(Error::InvalidInput(format!(
                "conflict {} has unknown item type",
                conflict.client_id
            ))),
        }
    }

    fn keep_server(db: &Database, conflict: ConflictItem) -> Result<()> {
        let version = conflict.server_version;
        match conflict.kind {
            ItemKind::Project => {
                let project = conflict.server_data.into_project()?;
                SqliteProjectRepository::new(db.connection())
                    .overwrite_from_server(&project, version)
            }
            ItemKind::Task => {
                let task = conflict.server_data.into_task()?;
                SqliteTaskRepository::new(db.connection()).overwrite_from_server(&task, version)
            }
            ItemKind::Unknown => Err(Error::InvalidInput(format!(
                "conflict {} has unknown item type",
                conflict.client_id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Task;
    use crate::sync::wire::SyncItem;

    fn conflict_for(local: &Task, server_content: &str, server_version: i64) -> ConflictItem {
        let mut server_row = local.clone();
        server_row.content = server_content.to_string();
        let mut server_data = SyncItem::from_task(&server_row);
        server_data.sync_version = server_version;

        ConflictItem {
            client_id: local.id.clone(),
            kind: ItemKind::Task,
            server_version,
            server_data,
            client_data: SyncItem::from_task(local),
        }
    }

    fn setup() -> (Database, Task) {
        let db = Database::open_in_memory().unwrap();
        let task = Task::new("local value", None);
        SqliteTaskRepository::new(db.connection())
            .create(&task)
            .unwrap();
        (db, task)
    }

    #[test]
    fn keep_local_redirties_with_fresh_timestamp() {
        let (db, task) = setup();
        let repo = SqliteTaskRepository::new(db.connection());
        let before = repo.get(&task.id).unwrap().unwrap().updated_at;

        let mut resolver = ConflictResolver::new();
        resolver.enqueue([conflict_for(&task, "server value", 18)]);

        let outcome = resolver
            .resolve_current(&db, ConflictChoice::KeepLocal)
            .unwrap();
        assert!(outcome.drained);
        assert!(outcome.rewrote_local);

        let fetched = repo.get(&task.id).unwrap().unwrap();
        assert_eq!(fetched.content, "local value");
        assert!(fetched.is_dirty());
        assert!(fetched.updated_at >= before);
    }

    #[test]
    fn keep_server_overwrites_and_cleans() {
        let (db, task) = setup();
        let mut resolver = ConflictResolver::new();
        resolver.enqueue([conflict_for(&task, "server value", 18)]);

        let outcome = resolver
            .resolve_current(&db, ConflictChoice::KeepServer)
            .unwrap();
        assert!(!outcome.rewrote_local);

        let fetched = SqliteTaskRepository::new(db.connection())
            .get(&task.id)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.content, "server value");
        assert_eq!(fetched.sync_version, Some(18));
    }

    #[test]
    fn ignore_leaves_row_dirty() {
        let (db, task) = setup();
        let mut resolver = ConflictResolver::new();
        resolver.enqueue([conflict_for(&task, "server value", 18)]);

        resolver
            .resolve_current(&db, ConflictChoice::Ignore)
            .unwrap();

        let fetched = SqliteTaskRepository::new(db.connection())
            .get(&task.id)
            .unwrap()
            .unwrap();
        assert_eq!(fetched.content, "local value");
        assert!(fetched.is_dirty());
    }

    #[test]
    fn queue_advances_fifo() {
        let (db, first) = setup();
        let second = Task::new("second", None);
        SqliteTaskRepository::new(db.connection())
            .create(&second)
            .unwrap();

        let mut resolver = ConflictResolver::new();
        resolver.enqueue([
            conflict_for(&first, "a", 20),
            conflict_for(&second, "b", 21),
        ]);

        assert_eq!(resolver.current().unwrap().client_id, first.id);
        let outcome = resolver
            .resolve_current(&db, ConflictChoice::Ignore)
            .unwrap();
        assert!(!outcome.drained);
        assert_eq!(resolver.current().unwrap().client_id, second.id);

        let outcome = resolver
            .resolve_current(&db, ConflictChoice::Ignore)
            .unwrap();
        assert!(outcome.drained);
        assert!(resolver.is_empty());
    }

    #[test]
    fn resolving_an_empty_queue_is_an_error() {
        let (db, _) = setup();
        let mut resolver = ConflictResolver::new();
        assert!(resolver
            .resolve_current(&db, ConflictChoice::Ignore)
            .is_err());
    }
}
