//! Replica-local sync settings
//!
//! One JSON file per replica, at a path the caller chooses. Holds the
//! server endpoint, session credentials, and the replica's sync cursor.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Persisted sync state for one replica
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub server_url: String,
    /// Bearer session token; empty when logged out
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub user_id: String,
    /// Highest server version this replica has seen
    #[serde(default)]
    pub last_sync_version: i64,
    /// Gates auto-sync: set after the first successful sync of a login
    #[serde(default)]
    pub has_synced_once: bool,
    /// Unix timestamp of the last automatic sync attempt
    #[serde(default)]
    pub last_auto_sync_epoch: i64,
}

impl std::fmt::Debug for SyncSettings {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("SyncSettings")
            .field("server_url", &self.server_url)
            .field("token", &"[REDACTED]")
            .field("user_id", &self.user_id)
            .field("last_sync_version", &self.last_sync_version)
            .field("has_synced_once", &self.has_synced_once)
            .field("last_auto_sync_epoch", &self.last_auto_sync_epoch)
            .finish()
    }
}

impl SyncSettings {
    /// Load settings from `path`, defaulting when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(Self {
                server_url: default_server_url(),
                ..Self::default()
            }),
            Err(error) => Err(error.into()),
        }
    }

    /// Persist settings to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    /// A session token is stored.
    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        !self.token.is_empty()
    }

    /// Auto-sync is allowed: logged in and the initial sync completed.
    #[must_use]
    pub fn can_auto_sync(&self) -> bool {
        self.is_logged_in() && self.has_synced_once
    }

    /// Wipe credentials and the sync cursor (logout or rejected session).
    pub fn clear_session(&mut self) {
        self.token.clear();
        self.user_id.clear();
        self.last_sync_version = 0;
        self.has_synced_once = false;
    }
}

fn default_server_url() -> String {
    std::env::var("FERROTASK_SERVER_URL")
        .ok()
        .filter(|value| !value.trim().is_empty())
        .unwrap_or_else(|| "http://127.0.0.1:8080".to_string())
}
