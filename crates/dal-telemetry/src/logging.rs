//! tracing-subscriber setup.
//!
//! JSON lines in containers, compact human output in development. The
//! filter is the configured level; `TelemetryConfig::from_env` has already
//! resolved `DAL_LOG_LEVEL` over `RUST_LOG`, and a CLI override wins over both.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

fn log_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    EnvFilter::try_new(&config.log_level).map_err(|e| TelemetryError::Config(e.to_string()))
}

pub(crate) fn init_logging(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = log_filter(config)?;

    if !config.console_output {
        return tracing_subscriber::registry()
            .with(env_filter)
            .try_init()
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()));
    }

    if config.json_logs {
        let json_layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_current_span(true)
            .with_span_list(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .try_init()
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_ansi(true);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| TelemetryError::SubscriberInit(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_follows_configured_level() {
        let config = TelemetryConfig::default().with_log_level("dal_session=debug");
        let filter = log_filter(&config).unwrap();
        assert_eq!(filter.to_string(), "dal_session=debug");
    }

    #[test]
    fn test_invalid_level_is_a_config_error() {
        let config = TelemetryConfig::default().with_log_level("dal_session=loud");
        assert!(matches!(log_filter(&config), Err(TelemetryError::Config(_))));
    }
}
