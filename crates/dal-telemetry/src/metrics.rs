//! Prometheus metrics for the iteration coordinator.
//!
//! All metrics follow the naming convention: `dal_<area>_<metric>_<unit>`

use lazy_static::lazy_static;
use prometheus::{Counter, CounterVec, Encoder, Opts, Registry, TextEncoder};

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // SESSION
    // =========================================================================

    /// Iterations whose training finished
    pub static ref ITERATIONS_COMPLETED: Counter = Counter::new(
        "dal_session_iterations_completed_total",
        "Total number of iterations that completed training"
    ).expect("metric creation failed");

    /// Distinct samples counted towards batch progress
    pub static ref SAMPLES_COMPLETED: Counter = Counter::new(
        "dal_session_samples_completed_total",
        "Total distinct (round, sample) completions counted"
    ).expect("metric creation failed");

    /// Completions ignored because the (round, sample) pair was already counted
    pub static ref DUPLICATE_COMPLETIONS: Counter = Counter::new(
        "dal_session_duplicate_completions_total",
        "Sample completions dropped as duplicates"
    ).expect("metric creation failed");

    /// Errors by classification
    pub static ref SESSION_ERRORS: CounterVec = CounterVec::new(
        Opts::new("dal_session_errors_total", "Classified session errors"),
        &["class"]
    ).expect("metric creation failed");

    // =========================================================================
    // ADAPTERS
    // =========================================================================

    /// Ledger reads that needed another attempt
    pub static ref LEDGER_READ_RETRIES: Counter = Counter::new(
        "dal_ledger_read_retries_total",
        "Ledger read attempts beyond the first"
    ).expect("metric creation failed");

    /// Ledger event subscriptions re-established by the bridge
    pub static ref BRIDGE_RECONNECTS: Counter = Counter::new(
        "dal_bridge_reconnects_total",
        "Ledger subscriptions re-established after a failure"
    ).expect("metric creation failed");

    /// Training-service polls by endpoint
    pub static ref TRAINING_POLLS: CounterVec = CounterVec::new(
        Opts::new("dal_training_polls_total", "Training-service polls"),
        &["endpoint", "outcome"]
    ).expect("metric creation failed");
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once; collectors already registered are skipped.
pub fn register_metrics() -> Result<(), TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ITERATIONS_COMPLETED.clone()),
        Box::new(SAMPLES_COMPLETED.clone()),
        Box::new(DUPLICATE_COMPLETIONS.clone()),
        Box::new(SESSION_ERRORS.clone()),
        Box::new(LEDGER_READ_RETRIES.clone()),
        Box::new(BRIDGE_RECONNECTS.clone()),
        Box::new(TRAINING_POLLS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }
    Ok(())
}

/// Encode all metrics as Prometheus text format.
pub fn gather_metrics() -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics_twice() {
        register_metrics().unwrap();
        register_metrics().unwrap();
    }

    #[test]
    fn test_gathered_text_contains_counters() {
        register_metrics().unwrap();
        ITERATIONS_COMPLETED.inc();
        TRAINING_POLLS.with_label_values(&["status", "ok"]).inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("dal_session_iterations_completed_total"));
        assert!(text.contains("dal_training_polls_total"));
    }

    #[test]
    fn test_counter_increment() {
        let before = DUPLICATE_COMPLETIONS.get();
        DUPLICATE_COMPLETIONS.inc();
        assert!(DUPLICATE_COMPLETIONS.get() >= before + 1.0);
    }
}
