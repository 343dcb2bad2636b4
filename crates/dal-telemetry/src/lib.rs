//! # DAL Telemetry
//!
//! Logging and metrics for the iteration coordinator.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dal_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `DAL_LOG_LEVEL` / `RUST_LOG` | `info` | Log level filter |
//! | `DAL_JSON_LOGS` | `false` (`true` in containers) | JSON formatted logs |
//! | `DAL_CONSOLE_OUTPUT` | `true` | Write logs to stderr |
//! | `DAL_SERVICE_NAME` | `dal-coordinator` | Service name on every log line |
//! | `DAL_METRICS_ENABLED` | `true` | Register Prometheus collectors |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use metrics::{
    gather_metrics, register_metrics, BRIDGE_RECONNECTS, DUPLICATE_COMPLETIONS,
    ITERATIONS_COMPLETED, LEDGER_READ_RETRIES, SAMPLES_COMPLETED, SESSION_ERRORS,
    TRAINING_POLLS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize log subscriber: {0}")]
    SubscriberInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Initialize logging and metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    if config.metrics_enabled {
        register_metrics()?;
    }

    logging::init_logging(&config)?;

    tracing::info!(
        service = %config.service_name,
        json_logs = config.json_logs,
        metrics = config.metrics_enabled,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard {
        service_name: config.service_name,
    })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    service_name: String,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!(service = %self.service_name, "Shutting down telemetry");
    }
}

/// Span carrying the identity of one iteration session.
#[macro_export]
macro_rules! session_span {
    ($project:expr, $participant:expr, $role:expr) => {
        tracing::info_span!(
            "session",
            project = %$project,
            participant = %$participant,
            role = %$role
        )
    };
}

/// Convenience macro for recording a metric increment.
#[macro_export]
macro_rules! metric_inc {
    ($metric:expr) => {
        $metric.inc()
    };
    ($metric:expr, $labels:expr) => {
        $metric.with_label_values($labels).inc()
    };
}
