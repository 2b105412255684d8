//! Database configuration

use serde::{Deserialize, Serialize};

const DEFAULT_URL: &str = "sqlite://walletctl.db";

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite connection URL
    #[serde(default = "default_url")]
    pub url: String,
    /// Maximum pool connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Connection acquire timeout in seconds
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_secs: u64,
}

fn default_url() -> String {
    DEFAULT_URL.to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout() -> u64 {
    30
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout(),
        }
    }
}

impl DatabaseConfig {
    /// Create config from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("WALLETCTL_DATABASE_URL").unwrap_or_else(|_| default_url()),
            max_connections: std::env::var("WALLETCTL_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_max_connections),
            acquire_timeout_secs: std::env::var("WALLETCTL_DB_ACQUIRE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_else(default_acquire_timeout),
        }
    }

    /// A private in-memory database
    pub fn in_memory() -> Self {
        Self {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Default::default()
        }
    }

    /// Whether the URL points at an in-memory database.
    ///
    /// Every connection to `:memory:` opens a fresh database, so the pool
    /// must be pinned to a single long-lived connection.
    pub fn is_memory(&self) -> bool {
        self.url.contains(":memory:") || self.url.contains("mode=memory")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_memory_detection() {
        assert!(DatabaseConfig::in_memory().is_memory());
        assert!(!DatabaseConfig::default().is_memory());
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: DatabaseConfig =
            serde_json::from_str(r#"{"url": "sqlite://other.db"}"#).unwrap();
        assert_eq!(config.url, "sqlite://other.db");
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.acquire_timeout_secs, 30);
    }
}
