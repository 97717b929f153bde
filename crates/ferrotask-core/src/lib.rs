//! ferrotask-core - Core library for Ferrotask
//!
//! This crate contains the shared models, the local replica store, and the
//! synchronization engine (wire types, sync client, auto-sync scheduler,
//! conflict resolver) used by all Ferrotask interfaces.

pub mod db;
pub mod error;
pub mod models;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Priority, Project, Task, TaskStatus};
pub use sync::{AutoSync, ConflictResolver, SyncClient, SyncMode, SyncReport, SyncSettings};
