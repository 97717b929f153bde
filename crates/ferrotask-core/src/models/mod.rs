//! Data models shared by all Ferrotask interfaces

mod project;
mod task;

pub use project::{Project, INBOX_PROJECT_ID};
pub use task::{Priority, Task, TaskStatus};
