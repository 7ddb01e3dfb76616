// Logging setup
//
// Console logging to stderr through `tracing-subscriber` with an
// env-driven filter.
// Library code only emits `tracing` events; binaries call `init_tracing`
// once at startup.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when neither `RUST_LOG` nor `LOG_LEVEL` is set
pub const DEFAULT_LOG_FILTER: &str = "taskgrid_engine=info";

/// Configuration for console logging
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log filter (e.g., "info", "taskgrid_engine=debug")
    pub log_filter: Option<String>,
    /// Whether to include the event target in each line
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "taskgrid".to_string(),
            log_filter: None,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `TASKGRID_SERVICE_NAME`: Service name (default: "taskgrid")
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    pub fn from_env() -> Self {
        Self {
            service_name: std::env::var("TASKGRID_SERVICE_NAME")
                .unwrap_or_else(|_| "taskgrid".to_string()),
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            with_target: true,
        }
    }

    /// Override the log filter
    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = Some(filter.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        self.log_filter
            .as_deref()
            .and_then(|f| EnvFilter::try_new(f).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
    }
}

/// Install the global subscriber
///
/// Returns `false` if a subscriber was already installed (for example by
/// a test harness); the existing one is kept.
///
/// # Example
///
/// ```no_run
/// use taskgrid_engine::telemetry::{init_tracing, TelemetryConfig};
///
/// init_tracing(TelemetryConfig::from_env());
/// ```
pub fn init_tracing(config: TelemetryConfig) -> bool {
    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .with_filter(config.filter());

    let installed = tracing_subscriber::registry()
        .with(console_layer)
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(service = %config.service_name, "Tracing initialized");
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TelemetryConfig::default();
        assert_eq!(config.service_name, "taskgrid");
        assert!(config.log_filter.is_none());
        assert_eq!(config.filter().to_string(), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_invalid_filter_falls_back() {
        let config = TelemetryConfig::default().with_log_filter("taskgrid=verbose");
        assert_eq!(config.filter().to_string(), DEFAULT_LOG_FILTER);
    }

    #[test]
    fn test_custom_filter() {
        let config = TelemetryConfig::default().with_log_filter("debug");
        assert_eq!(config.filter().to_string(), "debug");
    }
}
