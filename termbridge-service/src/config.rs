//! Service Configuration Module
//!
//! Everything the host process reads from the environment, validated once
//! at startup. Component sections come from [`TermBridgeConfig`].

use termbridge_core::{TermBridgeConfig, TermBridgeResult};

use crate::telemetry::TelemetryConfig;

/// Full configuration of the host process.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub termbridge: TermBridgeConfig,
    pub telemetry: TelemetryConfig,
}

impl ServiceConfig {
    /// Load and validate configuration from environment variables.
    ///
    /// See [`TermBridgeConfig::from_env`] and [`TelemetryConfig::from_env`]
    /// for the variables read.
    pub fn from_env() -> TermBridgeResult<Self> {
        let config = Self {
            termbridge: TermBridgeConfig::from_env(),
            telemetry: TelemetryConfig::from_env(),
        };
        config.termbridge.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::LogFormat;

    #[test]
    fn test_default_config_requires_api_key() {
        let config = ServiceConfig::default();
        assert!(config.termbridge.validate().is_err());
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
    }

    #[test]
    fn test_config_with_api_key_validates() {
        let mut config = ServiceConfig::default();
        config.termbridge.upstream.api_key = "key".to_string();
        assert!(config.termbridge.validate().is_ok());
    }
}
