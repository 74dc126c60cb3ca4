//! Driver configuration.
//!
//! Settings can be built in code with the `with_*` builders or read from
//! environment variables with [`DriverConfig::from_env`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::driver::FaultTolerance;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable has an invalid value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    /// Configuration validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration for a dedicated-worker driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverConfig {
    /// Number of items the inbound channel holds before producers wait.
    pub queue_capacity: usize,
    /// How long the worker waits for an item before re-checking for a stop request.
    pub poll_timeout: Duration,
    /// What to do when `process` fails on an item.
    pub fault_tolerance: FaultTolerance,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            poll_timeout: Duration::from_millis(50),
            fault_tolerance: FaultTolerance::Checked,
        }
    }
}

impl DriverConfig {
    /// Creates a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `STAGEDRIVE_QUEUE_CAPACITY`: inbound channel capacity (default: 1024)
    /// - `STAGEDRIVE_POLL_TIMEOUT_MS`: worker poll timeout in milliseconds (default: 50)
    /// - `STAGEDRIVE_FAULT_TOLERANCE`: `strict`, `continue` or `checked` (default: checked)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a variable has an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary key lookup.
    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("STAGEDRIVE_QUEUE_CAPACITY") {
            config.queue_capacity = parse_env_value(&val, "STAGEDRIVE_QUEUE_CAPACITY")?;
        }

        if let Some(val) = lookup("STAGEDRIVE_POLL_TIMEOUT_MS") {
            let millis: u64 = parse_env_value(&val, "STAGEDRIVE_POLL_TIMEOUT_MS")?;
            config.poll_timeout = Duration::from_millis(millis);
        }

        if let Some(val) = lookup("STAGEDRIVE_FAULT_TOLERANCE") {
            config.fault_tolerance =
                val.parse()
                    .map_err(|message| ConfigError::InvalidValue {
                        key: "STAGEDRIVE_FAULT_TOLERANCE".to_string(),
                        message,
                    })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationFailed` if any values are invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::ValidationFailed(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }

        if self.poll_timeout.is_zero() {
            return Err(ConfigError::ValidationFailed(
                "poll_timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Builder method to set the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Builder method to set the poll timeout.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Builder method to set the fault-tolerance policy.
    pub fn with_fault_tolerance(mut self, policy: FaultTolerance) -> Self {
        self.fault_tolerance = policy;
        self
    }
}

/// Parse an environment variable value into a type.
fn parse_env_value<T: std::str::FromStr>(value: &str, key: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("could not parse '{}'", value),
    })
}
