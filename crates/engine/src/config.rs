//! Coordinator configuration
//!
//! Loaded from builder calls or from environment variables.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;

/// Default number of worker threads per pool
pub const DEFAULT_WORKERS: usize = 4;

/// Coordinator configuration
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use taskgrid_engine::CoordinatorConfig;
///
/// let config = CoordinatorConfig::default()
///     .with_workers(8)
///     .with_drain_timeout(Duration::from_secs(30));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CoordinatorConfig {
    /// Coordinator name, used for thread names and log fields
    pub name: String,

    /// Number of worker threads spawned per pool
    pub n_workers: usize,

    /// Fixed idle interval of the control loop
    #[serde(with = "duration_millis")]
    pub poll_interval: Duration,

    /// Upper bound for draining the pool in `set_function` and `finalize`
    #[serde(with = "duration_millis")]
    pub drain_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            name: format!("coordinator-{}", Uuid::now_v7()),
            n_workers: DEFAULT_WORKERS,
            poll_interval: Duration::from_millis(5),
            drain_timeout: Duration::from_secs(10),
        }
    }
}

impl CoordinatorConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `TASKGRID_WORKERS`: Worker threads per pool (default: 4)
    /// - `TASKGRID_POLL_INTERVAL_MS`: Control loop idle interval (default: 5)
    /// - `TASKGRID_DRAIN_TIMEOUT_MS`: Drain timeout (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let n_workers = env::var("TASKGRID_WORKERS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.n_workers);

        let poll_interval = env::var("TASKGRID_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.poll_interval);

        let drain_timeout = env::var("TASKGRID_DRAIN_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.drain_timeout);

        Self {
            n_workers,
            poll_interval,
            drain_timeout,
            ..defaults
        }
    }

    /// Set the coordinator name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the number of worker threads
    pub fn with_workers(mut self, n_workers: usize) -> Self {
        self.n_workers = n_workers;
        self
    }

    /// Set the control loop idle interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set the drain timeout
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.n_workers == 0 {
            return Err(EngineError::InvalidConfig(
                "n_workers must be at least 1".into(),
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(EngineError::InvalidConfig(
                "poll_interval must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

/// Serde support for Duration as milliseconds
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
