//! Configuration types for catalog-bulk

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Retry and backoff configuration
///
/// Shared by the per-item retry path and the listing page fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries per item or page (default: 3)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Delay before the first retry (default: 1000 ms)
    #[serde(default = "default_initial_delay", with = "duration_ms_serde")]
    pub initial_delay: Duration,

    /// Upper bound for any single delay (default: 60 s)
    #[serde(default = "default_max_delay", with = "duration_ms_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: false)
    #[serde(default)]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: false,
        }
    }
}

/// Options for one run of the worker pool
///
/// Taken from [`Config::run`] by `start`, or passed explicitly to `start_with`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunOptions {
    /// Number of workers, i.e. maximum in-flight apply calls (default: 3)
    ///
    /// `1` processes items strictly one after another.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Pause after every settled attempt before a worker claims again (default: 200 ms)
    #[serde(default = "default_inter_item_delay", with = "duration_ms_serde")]
    pub inter_item_delay: Duration,

    /// Retry and backoff settings; `max_retries` is the per-item retry limit
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            inter_item_delay: default_inter_item_delay(),
            retry: RetryConfig::default(),
        }
    }
}

impl RunOptions {
    /// Check that the options describe a runnable pool
    pub fn validate(&self) -> Result<()> {
        if self.concurrency_limit == 0 {
            return Err(Error::config(
                "concurrency_limit",
                "concurrency_limit must be at least 1",
            ));
        }
        if !self.retry.backoff_multiplier.is_finite() || self.retry.backoff_multiplier < 1.0 {
            return Err(Error::config(
                "backoff_multiplier",
                format!(
                    "backoff_multiplier must be a finite value >= 1.0, got {}",
                    self.retry.backoff_multiplier
                ),
            ));
        }
        if self.retry.max_delay < self.retry.initial_delay {
            return Err(Error::config(
                "max_delay",
                "max_delay must not be smaller than initial_delay",
            ));
        }
        Ok(())
    }
}

/// Main configuration for [`BulkOrchestrator`](crate::BulkOrchestrator)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default run options used by `start`
    #[serde(default)]
    pub run: RunOptions,

    /// Capacity of the event broadcast channel (default: 1024)
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            run: RunOptions::default(),
            event_buffer: default_event_buffer(),
        }
    }
}

impl Config {
    /// Load and validate a JSON configuration file
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate all settings
    pub fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(Error::config("event_buffer", "event_buffer must be at least 1"));
        }
        self.run.validate()
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_concurrency_limit() -> usize {
    3
}

fn default_inter_item_delay() -> Duration {
    Duration::from_millis(200)
}

fn default_event_buffer() -> usize {
    1024
}

// Durations are written as whole milliseconds
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}
