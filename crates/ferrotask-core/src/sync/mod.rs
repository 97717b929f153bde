//! Synchronization engine: wire types, sync client, background scheduler,
//! and conflict resolution.
//!
//! The relay speaks JSON over HTTP. A replica pushes its dirty rows, the
//! server assigns monotonically increasing versions, and the replica pulls
//! everything above its last seen version. Conflicts are detected on push
//! and handed to the UI through [`ConflictResolver`].

mod auto;
mod client;
mod conflict;
pub mod envelope;
mod settings;
pub mod wire;

pub use auto::{AutoSync, DEFAULT_DEBOUNCE, DEFAULT_POLL_INTERVAL};
pub use client::{SyncClient, SyncMode, SyncReport};
pub use conflict::{ConflictChoice, ConflictResolver, ResolutionOutcome};
pub use settings::SyncSettings;
pub use wire::{ConflictItem, ItemKind, PullResponse, PushRequest, PushResponse, SyncItem};
