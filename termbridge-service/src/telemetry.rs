//! Tracing subscriber initialization.
//!
//! Library crates only emit `tracing` events; the subscriber is installed
//! here, once, at process start.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{ServiceError, ServiceResult};

const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn";

/// Output format of the fmt layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event.
    #[default]
    Json,
    /// Multi-line human readable output.
    Pretty,
}

impl LogFormat {
    fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "pretty" | "text" => LogFormat::Pretty,
            _ => LogFormat::Json,
        }
    }
}

/// Telemetry configuration from environment variables.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub log_format: LogFormat,
    /// Used when `RUST_LOG` is unset.
    pub default_filter: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "termbridge".to_string(),
            log_format: LogFormat::Json,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl TelemetryConfig {
    /// Environment variables:
    /// - `TERMBRIDGE_SERVICE_NAME` (default: termbridge)
    /// - `TERMBRIDGE_LOG_FORMAT`: "json" or "pretty" (default: json)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            service_name: std::env::var("TERMBRIDGE_SERVICE_NAME")
                .unwrap_or(defaults.service_name),
            log_format: std::env::var("TERMBRIDGE_LOG_FORMAT")
                .map(|s| LogFormat::parse(&s))
                .unwrap_or(defaults.log_format),
            default_filter: defaults.default_filter,
        }
    }
}

/// Install the global tracing subscriber.
///
/// Fails if a subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> ServiceResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
    };
    result.map_err(|e| ServiceError::Telemetry(e.to_string()))?;

    tracing::info!(
        service_name = %config.service_name,
        log_format = ?config.log_format,
        "Telemetry initialized"
    );
    Ok(())
}
