//! Coordinator configuration.
//!
//! Values come from struct literals, serde (TOML/JSON sections of a host
//! application's config) or environment variables via [`CoordinatorConfig::load`].

use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

mod defaults {
    pub fn region_name() -> String {
        "cluster".to_string()
    }
    pub fn source_name() -> String {
        "leader-coordinator".to_string()
    }
    pub fn retry_backoff_ms() -> u64 {
        1_000
    }
    pub fn shutdown_timeout_ms() -> u64 {
        10_000
    }
}

const ENV_REGION_NAME: &str = "LEADER_REGION_NAME";
const ENV_SOURCE_NAME: &str = "LEADER_SOURCE_NAME";
const ENV_RETRY_BACKOFF_MS: &str = "LEADER_RETRY_BACKOFF_MS";
const ENV_SHUTDOWN_TIMEOUT_MS: &str = "LEADER_SHUTDOWN_TIMEOUT_MS";
const ENV_RENEW_INTERVAL_MS: &str = "LEADER_RENEW_INTERVAL_MS";

/// Configuration error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration for {key}: '{value}' ({reason})")]
    InvalidValue { key: String, value: String, reason: String },
}

/// Configuration for a [`LeaderCoordinator`](crate::LeaderCoordinator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Name of the lock region created at `start()`.
    #[serde(default = "defaults::region_name")]
    pub region_name: String,
    /// Source name passed to the event publisher.
    #[serde(default = "defaults::source_name")]
    pub source_name: String,
    /// Longest pause after a failed election iteration. Retries start at 50ms
    /// and double on each consecutive failure up to this value.
    #[serde(default = "defaults::retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    /// Upper bound on `shutdown()` waiting for the worker.
    #[serde(default = "defaults::shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Renew the held lock at this interval. `None` holds without renewing.
    #[serde(default)]
    pub renew_interval_ms: Option<u64>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            region_name: defaults::region_name(),
            source_name: defaults::source_name(),
            retry_backoff_ms: defaults::retry_backoff_ms(),
            shutdown_timeout_ms: defaults::shutdown_timeout_ms(),
            renew_interval_ms: None,
        }
    }
}

impl CoordinatorConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            region_name: lookup(ENV_REGION_NAME).unwrap_or_else(defaults::region_name),
            source_name: lookup(ENV_SOURCE_NAME).unwrap_or_else(defaults::source_name),
            retry_backoff_ms: parse_ms(&lookup, ENV_RETRY_BACKOFF_MS)?.unwrap_or_else(defaults::retry_backoff_ms),
            shutdown_timeout_ms: parse_ms(&lookup, ENV_SHUTDOWN_TIMEOUT_MS)?
                .unwrap_or_else(defaults::shutdown_timeout_ms),
            renew_interval_ms: parse_ms(&lookup, ENV_RENEW_INTERVAL_MS)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject values the coordinator cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.region_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: ENV_REGION_NAME.to_string(),
                value: String::new(),
                reason: "region name must not be empty".to_string(),
            });
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: ENV_SHUTDOWN_TIMEOUT_MS.to_string(),
                value: "0".to_string(),
                reason: "shutdown timeout must be positive".to_string(),
            });
        }
        if self.renew_interval_ms == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: ENV_RENEW_INTERVAL_MS.to_string(),
                value: "0".to_string(),
                reason: "renew interval must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// How long `shutdown()` waits for the worker.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Lock renewal period, if renewal is enabled.
    pub fn renew_interval(&self) -> Option<Duration> {
        self.renew_interval_ms.map(Duration::from_millis)
    }
}

fn parse_ms<F>(lookup: &F, key: &str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw.trim().parse::<u64>().map(Some).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw.clone(),
            reason: format!("must be a whole number of milliseconds: {e}"),
        }),
    }
}
