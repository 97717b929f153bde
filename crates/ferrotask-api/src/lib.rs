//! ferrotask-api - Central sync relay
//!
//! Persists the authoritative copy of every user's projects and tasks,
//! assigns the global monotonic version sequence, and serves the push/pull
//! protocol replicas converge through. Exposed as a library so integration
//! tests can mount the router in-process.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod store;

pub use config::AppConfig;
pub use error::AppError;
pub use routes::{app_router, AppState};
pub use store::ServerStore;
