//! Engine configuration.
//!
//! Loaded from environment variables with defaults suitable for local
//! development and tests.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use campus_content::{PageLimits, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};

use crate::retry::RetryConfig;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue {
        /// Configuration key.
        key: String,
        /// Error message.
        message: String,
    },
}

impl ConfigError {
    fn invalid(key: &str, message: impl Into<String>) -> Self {
        ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Access engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Bound on a single store call in milliseconds.
    pub store_timeout_ms: u64,

    /// Retries of a read after a transient store error.
    pub store_max_retries: u32,

    /// Page size when the caller gives none.
    pub default_page_limit: usize,

    /// Largest page size; larger requests are clamped.
    pub max_page_limit: usize,

    /// Buffer of each event topic channel.
    pub event_channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_timeout_ms: 2_000,
            store_max_retries: 2,
            default_page_limit: DEFAULT_PAGE_LIMIT,
            max_page_limit: MAX_PAGE_LIMIT,
            event_channel_capacity: 1024,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `CAMPUS_STORE_TIMEOUT_MS`: store call timeout (default: 2000)
    /// - `CAMPUS_STORE_MAX_RETRIES`: read retries on transient errors (default: 2)
    /// - `CAMPUS_DEFAULT_PAGE_LIMIT`: default page size (default: 20)
    /// - `CAMPUS_MAX_PAGE_LIMIT`: maximum page size (default: 100)
    /// - `CAMPUS_EVENT_CHANNEL_CAPACITY`: event buffer per topic (default: 1024)
    ///
    /// Unparsable values are logged and fall back to the default; call
    /// [`validate`] to reject out-of-range ones.
    ///
    /// [`validate`]: EngineConfig::validate
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let default = Self::default();

        Self {
            store_timeout_ms: read_or(
                &lookup,
                "CAMPUS_STORE_TIMEOUT_MS",
                default.store_timeout_ms,
            ),
            store_max_retries: read_or(
                &lookup,
                "CAMPUS_STORE_MAX_RETRIES",
                default.store_max_retries,
            ),
            default_page_limit: read_or(
                &lookup,
                "CAMPUS_DEFAULT_PAGE_LIMIT",
                default.default_page_limit,
            ),
            max_page_limit: read_or(&lookup, "CAMPUS_MAX_PAGE_LIMIT", default.max_page_limit),
            event_channel_capacity: read_or(
                &lookup,
                "CAMPUS_EVENT_CHANNEL_CAPACITY",
                default.event_channel_capacity,
            ),
        }
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store_timeout_ms == 0 {
            return Err(ConfigError::invalid("CAMPUS_STORE_TIMEOUT_MS", "must be positive"));
        }
        if self.max_page_limit == 0 {
            return Err(ConfigError::invalid("CAMPUS_MAX_PAGE_LIMIT", "must be positive"));
        }
        if self.default_page_limit == 0 || self.default_page_limit > self.max_page_limit {
            return Err(ConfigError::invalid(
                "CAMPUS_DEFAULT_PAGE_LIMIT",
                format!("must be between 1 and {}", self.max_page_limit),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ConfigError::invalid("CAMPUS_EVENT_CHANNEL_CAPACITY", "must be positive"));
        }
        Ok(())
    }

    /// Store call timeout as a Duration.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    /// Page size bounds for the feed.
    pub fn page_limits(&self) -> PageLimits {
        PageLimits {
            default_limit: self.default_page_limit,
            max_limit: self.max_page_limit,
        }
    }

    /// Retry policy for reads.
    pub fn read_retry(&self) -> RetryConfig {
        RetryConfig::fast().with_max_attempts(self.store_max_retries.saturating_add(1))
    }
}

/// Parse one raw value.
pub fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::invalid(key, format!("{:?}: {}", raw, e)))
}

fn read_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + Display,
    T::Err: Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match parse_value(key, &raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, default = %default, "Ignoring configuration value");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.store_timeout(), Duration::from_secs(2));
        assert_eq!(config.read_retry().max_attempts, 3);
    }

    #[test]
    fn test_from_lookup() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CAMPUS_STORE_TIMEOUT_MS", "500"),
            ("CAMPUS_STORE_MAX_RETRIES", "0"),
            ("CAMPUS_DEFAULT_PAGE_LIMIT", " 10 "),
            ("CAMPUS_MAX_PAGE_LIMIT", "50"),
        ]));
        assert_eq!(config.store_timeout_ms, 500);
        assert_eq!(config.read_retry().max_attempts, 1);
        assert_eq!(
            config.page_limits(),
            PageLimits {
                default_limit: 10,
                max_limit: 50
            }
        );
        assert_eq!(config.event_channel_capacity, 1024);
    }

    #[test]
    fn test_unparsable_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CAMPUS_STORE_TIMEOUT_MS", "abc"),
            ("CAMPUS_MAX_PAGE_LIMIT", "-5"),
        ]));
        assert_eq!(config.store_timeout_ms, 2_000);
        assert_eq!(config.max_page_limit, MAX_PAGE_LIMIT);
    }

    #[test]
    fn test_parse_value_reports_the_key() {
        assert_eq!(parse_value::<u64>("CAMPUS_STORE_TIMEOUT_MS", " 250 "), Ok(250));

        let err = parse_value::<u64>("CAMPUS_STORE_TIMEOUT_MS", "abc").unwrap_err();
        assert!(matches!(
            &err,
            ConfigError::InvalidValue { key, message }
                if key == "CAMPUS_STORE_TIMEOUT_MS" && message.contains("abc")
        ));
        assert!(err.to_string().contains("CAMPUS_STORE_TIMEOUT_MS"));
    }

    #[test]
    fn test_validate_ranges() {
        let config = EngineConfig {
            default_page_limit: 200,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "CAMPUS_DEFAULT_PAGE_LIMIT"
        ));

        let config = EngineConfig {
            store_timeout_ms: 0,
            ..EngineConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
