//! Pump configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Longest accepted application name (it doubles as the subscription name).
pub const MAX_APPLICATION_NAME_LEN: usize = 50;
/// Upper bound for concurrent dispatches per pump.
pub const MAX_CONCURRENT_DISPATCHES: usize = 64;
/// Upper bound for one receive call, and so for how long `stop()` waits on an
/// idle pump.
pub const MAX_RECEIVE_TIMEOUT_MS: u64 = 60_000;

/// Invalid or unparsable configuration.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("application name must not be empty")]
    EmptyApplicationName,
    #[error("application name {name:?} is longer than {max} characters")]
    ApplicationNameTooLong { name: String, max: usize },
    #[error("application name {name:?} contains {invalid:?}; allowed are A-Z a-z 0-9 . _ -")]
    InvalidApplicationName { name: String, invalid: char },
    #[error("receive timeout must be greater than zero")]
    ZeroReceiveTimeout,
    #[error("receive timeout must be at most {max}ms, got {value}ms")]
    ReceiveTimeoutTooLong { value: u64, max: u64 },
    #[error("max concurrent dispatches must be between 1 and {max}, got {value}")]
    ConcurrencyOutOfRange { value: usize, max: usize },
    #[error("could not parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Settings shared by every pump an application runs.
///
/// ## Example
///
/// ```
/// use competing_pumps::PumpConfig;
///
/// let config = PumpConfig::from_json_str(r#"{
///     "application_name": "billing",
///     "max_concurrent_dispatches": 4
/// }"#).unwrap();
///
/// assert_eq!(config.application_name, "billing");
/// assert_eq!(config.max_concurrent_dispatches, 4);
/// assert_eq!(config.receive_timeout_ms, 1000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PumpConfig {
    /// Stable identity of the application; every instance sharing it competes
    /// for the same subscriptions.
    pub application_name: String,
    /// How long one receive call waits for a message. Also bounds how long a
    /// stop request can go unnoticed by an idle pump.
    pub receive_timeout_ms: u64,
    /// Messages a single pump may process at the same time.
    pub max_concurrent_dispatches: usize,
    /// Default wait for in-flight dispatches when stopping with a grace period.
    pub shutdown_grace_ms: u64,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            application_name: String::new(),
            receive_timeout_ms: 1000,
            max_concurrent_dispatches: 1,
            shutdown_grace_ms: 30_000,
        }
    }
}

impl PumpConfig {
    /// Default settings for the given application.
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            ..Self::default()
        }
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_max_concurrent_dispatches(mut self, max: usize) -> Self {
        self.max_concurrent_dispatches = max;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace_ms = u64::try_from(grace.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Parse JSON and validate the result.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let name = &self.application_name;
        if name.is_empty() {
            return Err(ConfigError::EmptyApplicationName);
        }
        if name.chars().count() > MAX_APPLICATION_NAME_LEN {
            return Err(ConfigError::ApplicationNameTooLong {
                name: name.clone(),
                max: MAX_APPLICATION_NAME_LEN,
            });
        }
        if let Some(invalid) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
        {
            return Err(ConfigError::InvalidApplicationName {
                name: name.clone(),
                invalid,
            });
        }
        if self.receive_timeout_ms == 0 {
            return Err(ConfigError::ZeroReceiveTimeout);
        }
        if self.receive_timeout_ms > MAX_RECEIVE_TIMEOUT_MS {
            return Err(ConfigError::ReceiveTimeoutTooLong {
                value: self.receive_timeout_ms,
                max: MAX_RECEIVE_TIMEOUT_MS,
            });
        }
        if !(1..=MAX_CONCURRENT_DISPATCHES).contains(&self.max_concurrent_dispatches) {
            return Err(ConfigError::ConcurrencyOutOfRange {
                value: self.max_concurrent_dispatches,
                max: MAX_CONCURRENT_DISPATCHES,
            });
        }
        Ok(())
    }

    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.receive_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
