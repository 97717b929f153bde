use std::collections::HashMap;
use std::env;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime configuration, loaded from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    /// Path of the SQLite database; `:memory:` for an ephemeral store
    pub database_path: String,
    pub session_ttl: Duration,
    pub magic_link_ttl: Duration,
    pub min_password_len: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "FERROTASK_API_BIND_ADDR", "127.0.0.1:8080");
        let database_path = value_or_default(&lookup, "FERROTASK_DB_PATH", "ferrotask.db");

        let session_ttl_days = value_or_default(&lookup, "FERROTASK_SESSION_TTL_DAYS", "30")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "FERROTASK_SESSION_TTL_DAYS must be an integer in [1, 365]".to_string(),
                )
            })?;
        if !(1..=365).contains(&session_ttl_days) {
            return Err(ConfigError::Invalid(
                "FERROTASK_SESSION_TTL_DAYS must be in [1, 365]".to_string(),
            ));
        }

        let magic_link_ttl_mins = value_or_default(&lookup, "FERROTASK_MAGIC_LINK_TTL_MINS", "15")
            .parse::<u64>()
            .map_err(|_| {
                ConfigError::Invalid(
                    "FERROTASK_MAGIC_LINK_TTL_MINS must be an integer in [1, 1440]".to_string(),
                )
            })?;
        if !(1..=1_440).contains(&magic_link_ttl_mins) {
            return Err(ConfigError::Invalid(
                "FERROTASK_MAGIC_LINK_TTL_MINS must be in [1, 1440]".to_string(),
            ));
        }

        Ok(Self {
            bind_addr,
            database_path,
            session_ttl: Duration::from_secs(session_ttl_days * 24 * 60 * 60),
            magic_link_ttl: Duration::from_secs(magic_link_ttl_mins * 60),
            min_password_len: 8,
        })
    }

    /// Config suitable for tests: in-memory store, short TTLs.
    #[must_use]
    pub fn for_tests() -> Self {
        Self {
            bind_addr: "127.0.0.1:0".to_string(),
            database_path: ":memory:".to_string(),
            session_ttl: Duration::from_secs(60 * 60),
            magic_link_ttl: Duration::from_secs(60),
            min_password_len: 8,
        }
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}
