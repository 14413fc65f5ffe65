//! Worker configuration.
//!
//! Settings come from the environment (optionally via `.env`) and can be
//! overridden on the command line.

use std::net::SocketAddr;
use std::time::Duration;
use tourney::EngineConfig;
use tourney::config::parse_env_or;
use tourney::db::DatabaseConfig;

/// Values given on the command line. `None` falls back to the environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub database_url: Option<String>,
    pub interval_secs: Option<u64>,
    pub metrics_addr: Option<SocketAddr>,
    pub once: bool,
    pub migrate: bool,
}

/// Complete worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database: DatabaseConfig,
    pub engine: EngineConfig,
    /// Prometheus scrape address, if metrics are enabled
    pub metrics_addr: Option<SocketAddr>,
    /// Run a single sweep and exit
    pub once: bool,
    /// Apply pending migrations before sweeping
    pub migrate: bool,
}

impl WorkerConfig {
    /// Load configuration from environment variables, with CLI overrides
    ///
    /// Besides the engine and database variables this reads:
    /// - `METRICS_BIND`: Prometheus listener address (optional)
    /// - `WORKER_RUN_MIGRATIONS` (default: false)
    pub fn from_env(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let database = match overrides.database_url {
            Some(url) => {
                let defaults = DatabaseConfig::with_url(url);
                DatabaseConfig {
                    max_connections: parse_env_or("DB_MAX_CONNECTIONS", defaults.max_connections),
                    min_connections: parse_env_or("DB_MIN_CONNECTIONS", defaults.min_connections),
                    connection_timeout_secs: parse_env_or(
                        "DB_CONNECTION_TIMEOUT",
                        defaults.connection_timeout_secs,
                    ),
                    idle_timeout_secs: parse_env_or("DB_IDLE_TIMEOUT", defaults.idle_timeout_secs),
                    max_lifetime_secs: parse_env_or("DB_MAX_LIFETIME", defaults.max_lifetime_secs),
                    ..defaults
                }
            }
            None => DatabaseConfig::from_env()?,
        };
        database.validate()?;

        let mut engine = EngineConfig::from_env()?;
        if let Some(secs) = overrides.interval_secs {
            engine.sweep_interval = Duration::from_secs(secs);
            engine.validate()?;
        }

        let metrics_addr = match overrides.metrics_addr {
            Some(addr) => Some(addr),
            None => match std::env::var("METRICS_BIND") {
                Ok(value) => Some(value.parse().map_err(|_| ConfigError::Invalid {
                    var: "METRICS_BIND".to_string(),
                    reason: format!("'{value}' is not a socket address"),
                })?),
                Err(_) => None,
            },
        };

        let migrate = overrides.migrate || parse_env_or("WORKER_RUN_MIGRATIONS", false);

        Ok(Self {
            database,
            engine,
            metrics_addr,
            once: overrides.once,
            migrate,
        })
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Settings(#[from] tourney::ConfigError),

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid {
            var: "METRICS_BIND".to_string(),
            reason: "'nope' is not a socket address".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("METRICS_BIND"));
        assert!(msg.contains("nope"));
    }

    #[test]
    fn test_settings_error_is_transparent() {
        let err: ConfigError = tourney::ConfigError::MissingRequired {
            var: "DATABASE_URL".to_string(),
            hint: "set it".to_string(),
        }
        .into();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
