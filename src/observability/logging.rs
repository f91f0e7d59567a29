//! # Structured Logging
//!
//! Installs the global tracing subscriber. `RUST_LOG` takes precedence over
//! the configured level; output is JSON or human-readable text.

use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

use crate::core::config::{LogConfig, LogFormat};
use crate::core::error::{GatewayError, GatewayResult};

/// Filter from `RUST_LOG`, falling back to the configured level
pub fn build_filter(config: &LogConfig) -> GatewayResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| GatewayError::config(format!("Invalid log level '{}': {}", config.level, e))),
    }
}

/// Initialize logging. A subscriber installed earlier (tests) is kept.
pub fn init_logging(config: &LogConfig) -> GatewayResult<()> {
    let filter = build_filter(config)?;

    let result = match config.format {
        LogFormat::Json => Registry::default()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false)
                    .with_target(true)
                    .with_thread_ids(true),
            )
            .try_init(),
        LogFormat::Text => Registry::default()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init(),
    };

    if result.is_err() {
        warn!("Tracing subscriber already initialized, skipping initialization");
    }

    info!(level = %config.level, format = ?config.format, "logging initialized");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_level_is_config_error() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LogConfig {
            level: "cache_gateway=notalevel".into(),
            format: LogFormat::Text,
        };
        assert!(matches!(build_filter(&config), Err(GatewayError::Configuration { .. })));
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let config = LogConfig {
            level: "debug".into(),
            format: LogFormat::Text,
        };
        init_logging(&config).unwrap();
        init_logging(&config).unwrap();
    }
}
