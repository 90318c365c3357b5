//! Supervisor configuration.
//!
//! ## Sentinel values
//! - `sweep_interval = 0s` → no periodic sweeping (only explicit `sweep()` and
//!   the shutdown sweep)
//! - `shutdown_grace = 0s` → shutdown does not wait for running detached work

use std::time::Duration;

use thiserror::Error;

pub const ENV_SWEEP_INTERVAL_MS: &str = "FAULTLINE_SWEEP_INTERVAL_MS";
pub const ENV_SWEEP_ON_SHUTDOWN: &str = "FAULTLINE_SWEEP_ON_SHUTDOWN";
pub const ENV_SHUTDOWN_GRACE_MS: &str = "FAULTLINE_SHUTDOWN_GRACE_MS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key} must be a non-negative integer (milliseconds), got {value:?}")]
    InvalidMillis { key: &'static str, value: String },

    #[error("{key} must be true/false/1/0, got {value:?}")]
    InvalidBool { key: &'static str, value: String },
}

/// Runtime settings for [`Supervisor`](crate::app::Supervisor).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// How often the background sweep loop runs a reclamation pass.
    pub sweep_interval: Duration,

    /// Run one last sweep when the supervisor shuts down.
    pub sweep_on_shutdown: bool,

    /// How long shutdown waits for detached work that is still running
    /// before the final sweep.
    pub shutdown_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            sweep_on_shutdown: true,
            shutdown_grace: Duration::from_millis(100),
        }
    }
}

impl SupervisorConfig {
    /// Defaults overridden by `FAULTLINE_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) but reads values through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_SWEEP_INTERVAL_MS) {
            config.sweep_interval = parse_millis(ENV_SWEEP_INTERVAL_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_SWEEP_ON_SHUTDOWN) {
            config.sweep_on_shutdown = parse_bool(ENV_SWEEP_ON_SHUTDOWN, &value)?;
        }
        if let Some(value) = lookup(ENV_SHUTDOWN_GRACE_MS) {
            config.shutdown_grace = parse_millis(ENV_SHUTDOWN_GRACE_MS, &value)?;
        }

        Ok(config)
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }

    pub fn with_sweep_on_shutdown(mut self, enabled: bool) -> Self {
        self.sweep_on_shutdown = enabled;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Periodic sweep interval as an `Option` (`None` when disabled).
    pub fn sweep_interval(&self) -> Option<Duration> {
        (!self.sweep_interval.is_zero()).then_some(self.sweep_interval)
    }
}

fn parse_millis(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidMillis {
            key,
            value: value.to_string(),
        })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key,
            value: value.to_string(),
        }),
    }
}
