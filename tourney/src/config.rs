//! Engine configuration.
//!
//! Timing windows and policies for the match lifecycle, loaded from the
//! environment with sensible defaults.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What happens to a match nobody reported before its deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Move to `expired` and wait for an admin forfeit or reopen
    HoldForAdmin,
    /// Move to `no_contest` with no winner; both participants are eliminated
    DoubleForfeit,
    /// Forfeit to the only checked-in participant, otherwise hold for admin
    #[default]
    ForfeitAbsent,
}

impl ExpiryPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpiryPolicy::HoldForAdmin => "hold_for_admin",
            ExpiryPolicy::DoubleForfeit => "double_forfeit",
            ExpiryPolicy::ForfeitAbsent => "forfeit_absent",
        }
    }
}

impl fmt::Display for ExpiryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpiryPolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "hold_for_admin" | "expire" => Ok(ExpiryPolicy::HoldForAdmin),
            "double_forfeit" | "no_contest" => Ok(ExpiryPolicy::DoubleForfeit),
            "forfeit_absent" | "forfeit" => Ok(ExpiryPolicy::ForfeitAbsent),
            other => Err(ConfigError::Invalid {
                var: "MATCH_EXPIRY_POLICY".to_string(),
                reason: format!("unknown policy '{other}'"),
            }),
        }
    }
}

/// Lifecycle timing and retry configuration
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Time the opponent has to confirm or contest a report
    pub grace_window: Duration,
    /// Fraction of the grace window after which the warning fires
    pub warning_fraction: f64,
    /// How long a ready match may sit unreported before it expires
    pub no_show_window: Duration,
    /// How long a live match may sit unreported before it expires
    pub live_report_window: Duration,
    /// Resolution applied to expired matches
    pub expiry_policy: ExpiryPolicy,
    /// Interval between scheduler sweeps
    pub sweep_interval: std::time::Duration,
    /// Reload-and-reapply attempts on a version conflict
    pub max_commit_attempts: u32,
}

impl EngineConfig {
    /// Create configuration from environment variables
    ///
    /// - `AUTO_CONFIRM_GRACE_MINUTES` (default: 1440)
    /// - `AUTO_CONFIRM_WARNING_FRACTION` (default: 0.75)
    /// - `SCHEDULED_NO_SHOW_HOURS` (default: 2)
    /// - `LIVE_REPORT_WINDOW_MINUTES` (default: 60)
    /// - `MATCH_EXPIRY_POLICY` (default: forfeit_absent)
    /// - `DEADLINE_SCAN_INTERVAL_SECONDS` (default: 60)
    /// - `MAX_COMMIT_ATTEMPTS` (default: 5)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let expiry_policy = match std::env::var("MATCH_EXPIRY_POLICY") {
            Ok(value) => value.parse()?,
            Err(_) => defaults.expiry_policy,
        };

        let config = Self {
            grace_window: Duration::minutes(parse_env_or("AUTO_CONFIRM_GRACE_MINUTES", 1440)),
            warning_fraction: parse_env_or("AUTO_CONFIRM_WARNING_FRACTION", 0.75),
            no_show_window: Duration::hours(parse_env_or("SCHEDULED_NO_SHOW_HOURS", 2)),
            live_report_window: Duration::minutes(parse_env_or("LIVE_REPORT_WINDOW_MINUTES", 60)),
            expiry_policy,
            sweep_interval: std::time::Duration::from_secs(parse_env_or(
                "DEADLINE_SCAN_INTERVAL_SECONDS",
                60,
            )),
            max_commit_attempts: parse_env_or("MAX_COMMIT_ATTEMPTS", 5),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grace_window <= Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "AUTO_CONFIRM_GRACE_MINUTES".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if !(self.warning_fraction > 0.0 && self.warning_fraction < 1.0) {
            return Err(ConfigError::Invalid {
                var: "AUTO_CONFIRM_WARNING_FRACTION".to_string(),
                reason: "Must be strictly between 0 and 1".to_string(),
            });
        }

        if self.no_show_window <= Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "SCHEDULED_NO_SHOW_HOURS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.live_report_window <= Duration::zero() {
            return Err(ConfigError::Invalid {
                var: "LIVE_REPORT_WINDOW_MINUTES".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Invalid {
                var: "DEADLINE_SCAN_INTERVAL_SECONDS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.max_commit_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "MAX_COMMIT_ATTEMPTS".to_string(),
                reason: "Must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Offset from the report time at which the warning fires
    pub fn warning_offset(&self) -> Duration {
        let millis = self.grace_window.num_milliseconds() as f64 * self.warning_fraction;
        Duration::milliseconds(millis.round() as i64)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grace_window: Duration::hours(24),
            warning_fraction: 0.75,
            no_show_window: Duration::hours(2),
            live_report_window: Duration::minutes(60),
            expiry_policy: ExpiryPolicy::default(),
            sweep_interval: std::time::Duration::from_secs(60),
            max_commit_attempts: 5,
        }
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Helper to parse environment variable with default fallback
pub fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grace_window, Duration::hours(24));
        assert_eq!(config.warning_offset(), Duration::hours(18));
    }

    #[test]
    fn test_warning_fraction_out_of_range() {
        let config = EngineConfig {
            warning_fraction: 1.0,
            ..EngineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("AUTO_CONFIRM_WARNING_FRACTION"));
    }

    #[test]
    fn test_zero_commit_attempts_rejected() {
        let config = EngineConfig {
            max_commit_attempts: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_expiry_policy_parsing() {
        assert_eq!(
            "double_forfeit".parse::<ExpiryPolicy>().unwrap(),
            ExpiryPolicy::DoubleForfeit
        );
        assert_eq!(
            "Hold_For_Admin".parse::<ExpiryPolicy>().unwrap(),
            ExpiryPolicy::HoldForAdmin
        );
        assert!("coin_flip".parse::<ExpiryPolicy>().is_err());
        assert_eq!(ExpiryPolicy::ForfeitAbsent.to_string(), "forfeit_absent");
    }
}
