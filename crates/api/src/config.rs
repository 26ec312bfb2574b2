//! Application configuration loaded from environment variables.

use std::time::Duration;

use sync::SyncConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `DATABASE_URL` — Postgres projection store; in-memory when unset
/// - `SYNC_INTERVAL_SECS` — self-heal backfill interval (default: `30`)
/// - `SYNC_OP_TIMEOUT_SECS` — per-operation log/store timeout (default: `10`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub sync_interval_secs: u64,
    pub sync_op_timeout_secs: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            database_url: std::env::var("DATABASE_URL").ok(),
            sync_interval_secs: std::env::var("SYNC_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            sync_op_timeout_secs: std::env::var("SYNC_OP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(10),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Builds the synchronizer configuration from the env-derived values.
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            heal_interval: Duration::from_secs(self.sync_interval_secs),
            op_timeout: Duration::from_secs(self.sync_op_timeout_secs),
            ..SyncConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            sync_interval_secs: 30,
            sync_op_timeout_secs: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.sync_interval_secs, 30);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Config::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }

    #[test]
    fn sync_config_from_values() {
        let config = Config {
            sync_interval_secs: 5,
            sync_op_timeout_secs: 2,
            ..Config::default()
        };
        let sync = config.sync_config();
        assert_eq!(sync.heal_interval, Duration::from_secs(5));
        assert_eq!(sync.op_timeout, Duration::from_secs(2));
    }
}
