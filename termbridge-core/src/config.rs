//! Configuration types
//!
//! Every section has a `Default`, a `from_env()` that falls back to the
//! default for unset or unparseable variables, and a `validate()`.

use crate::error::{ConfigError, TermBridgeResult};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// DEFAULTS
// ============================================================================

/// Default upstream REST base URL.
pub const DEFAULT_UPSTREAM_BASE_URL: &str = "http://rest.bioontology.org/bioportal";

/// Default number of retries for a failed upstream call.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default capacity of the volatile (LRU) response tier.
pub const DEFAULT_VOLATILE_CAPACITY: usize = 25;

/// Default LMDB map size in megabytes.
pub const DEFAULT_CACHE_MAX_SIZE_MB: usize = 512;

/// Default change feed polling period (1 hour).
pub const DEFAULT_FEED_CHECK_INTERVAL_SECS: u64 = 3600;

/// Default capacity of the monitor -> resolver change channel.
pub const DEFAULT_CHANGE_CHANNEL_CAPACITY: usize = 16;

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_flag(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| {
            let s = s.to_lowercase();
            s == "true" || s == "1"
        })
        .unwrap_or(default)
}

fn invalid(field: &str, value: impl fmt::Display, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

// ============================================================================
// RETRY
// ============================================================================

/// Retry policy for upstream HTTP calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub backoff_multiplier: f32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No retries and no waiting; used by tests.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Backoff to wait before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let factor = self.backoff_multiplier.max(1.0).powi(exponent);
        self.initial_backoff
            .mul_f32(factor)
            .min(self.max_backoff)
    }
}

// ============================================================================
// UPSTREAM
// ============================================================================

/// Upstream repository connection settings.
#[derive(Clone, PartialEq)]
pub struct UpstreamConfig {
    pub base_url: String,
    /// Sent as the `apikey` query parameter on every call.
    pub api_key: String,
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_UPSTREAM_BASE_URL.to_string(),
            api_key: String::new(),
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl fmt::Debug for UpstreamConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UpstreamConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("retry", &self.retry)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl UpstreamConfig {
    /// Environment variables:
    /// - `TERMBRIDGE_UPSTREAM_URL`: REST base URL
    /// - `TERMBRIDGE_UPSTREAM_API_KEY`: API key (required)
    /// - `TERMBRIDGE_UPSTREAM_MAX_RETRIES`: retries per call (default: 3)
    /// - `TERMBRIDGE_UPSTREAM_TIMEOUT_SECS`: per-request timeout (default: 60)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("TERMBRIDGE_UPSTREAM_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("TERMBRIDGE_UPSTREAM_API_KEY").unwrap_or_default(),
            retry: RetryConfig {
                max_retries: env_or("TERMBRIDGE_UPSTREAM_MAX_RETRIES", defaults.retry.max_retries),
                ..defaults.retry
            },
            request_timeout: Duration::from_secs(env_or(
                "TERMBRIDGE_UPSTREAM_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
        }
    }

    pub fn validate(&self) -> TermBridgeResult<()> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "upstream.api_key".to_string(),
            }
            .into());
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(invalid(
                "upstream.base_url",
                &self.base_url,
                "base_url must be an http(s) URL",
            )
            .into());
        }
        if self.retry.backoff_multiplier <= 0.0 {
            return Err(invalid(
                "upstream.retry.backoff_multiplier",
                self.retry.backoff_multiplier,
                "backoff_multiplier must be positive",
            )
            .into());
        }
        Ok(())
    }
}

/// Replace the value of every `apikey` query parameter in `url` so the URL
/// can be logged or put into an error message.
pub fn redact_api_key(url: &str) -> String {
    let Some((base, query)) = url.split_once('?') else {
        return url.to_string();
    };
    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if key.eq_ignore_ascii_case("apikey") => format!("{key}=[REDACTED]"),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");
    format!("{base}?{query}")
}

// ============================================================================
// RESPONSE CACHE
// ============================================================================

/// Response cache settings.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Directory holding the LMDB environment.
    pub path: PathBuf,
    pub max_size_mb: usize,
    pub volatile_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/response-cache"),
            max_size_mb: DEFAULT_CACHE_MAX_SIZE_MB,
            volatile_capacity: DEFAULT_VOLATILE_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Environment variables:
    /// - `TERMBRIDGE_CACHE_PATH`: LMDB directory (default: ./data/response-cache)
    /// - `TERMBRIDGE_CACHE_MAX_SIZE_MB`: LMDB map size (default: 512)
    /// - `TERMBRIDGE_CACHE_VOLATILE_CAPACITY`: LRU capacity (default: 25)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            path: std::env::var("TERMBRIDGE_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            max_size_mb: env_or("TERMBRIDGE_CACHE_MAX_SIZE_MB", defaults.max_size_mb),
            volatile_capacity: env_or(
                "TERMBRIDGE_CACHE_VOLATILE_CAPACITY",
                defaults.volatile_capacity,
            ),
        }
    }

    pub fn validate(&self) -> TermBridgeResult<()> {
        if self.max_size_mb == 0 {
            return Err(invalid("cache.max_size_mb", self.max_size_mb, "must be positive").into());
        }
        if self.volatile_capacity == 0 {
            return Err(invalid(
                "cache.volatile_capacity",
                self.volatile_capacity,
                "must be positive",
            )
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// CHANGE FEED MONITOR
// ============================================================================

/// Change feed polling settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedMonitorConfig {
    /// `None` disables the monitor.
    pub feed_url: Option<String>,
    pub check_interval: Duration,
    pub channel_capacity: usize,
}

impl Default for FeedMonitorConfig {
    fn default() -> Self {
        Self {
            feed_url: None,
            check_interval: Duration::from_secs(DEFAULT_FEED_CHECK_INTERVAL_SECS),
            channel_capacity: DEFAULT_CHANGE_CHANNEL_CAPACITY,
        }
    }
}

impl FeedMonitorConfig {
    /// Environment variables:
    /// - `TERMBRIDGE_FEED_URL`: change feed URL (unset disables the monitor)
    /// - `TERMBRIDGE_FEED_CHECK_INTERVAL_SECS`: polling period (default: 3600)
    /// - `TERMBRIDGE_FEED_CHANNEL_CAPACITY`: change channel capacity (default: 16)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            feed_url: std::env::var("TERMBRIDGE_FEED_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            check_interval: Duration::from_secs(env_or(
                "TERMBRIDGE_FEED_CHECK_INTERVAL_SECS",
                defaults.check_interval.as_secs(),
            )),
            channel_capacity: env_or(
                "TERMBRIDGE_FEED_CHANNEL_CAPACITY",
                defaults.channel_capacity,
            ),
        }
    }

    pub fn validate(&self) -> TermBridgeResult<()> {
        if self.check_interval.is_zero() {
            return Err(invalid(
                "feed.check_interval",
                format!("{:?}", self.check_interval),
                "check_interval must be positive",
            )
            .into());
        }
        if self.channel_capacity == 0 {
            return Err(invalid(
                "feed.channel_capacity",
                self.channel_capacity,
                "must be positive",
            )
            .into());
        }
        Ok(())
    }
}

// ============================================================================
// IDENTITY
// ============================================================================

/// Identity resolver startup behaviour.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityConfig {
    /// Populate names from the "latest" listings at startup.
    pub warm_on_startup: bool,
    /// Also name every version of each warmed ontology.
    pub warm_versions: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            warm_on_startup: true,
            warm_versions: true,
        }
    }
}

impl IdentityConfig {
    /// Environment variables:
    /// - `TERMBRIDGE_WARM_ON_STARTUP`: "true" or "false" (default: true)
    /// - `TERMBRIDGE_WARM_VERSIONS`: "true" or "false" (default: true)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            warm_on_startup: env_flag("TERMBRIDGE_WARM_ON_STARTUP", defaults.warm_on_startup),
            warm_versions: env_flag("TERMBRIDGE_WARM_VERSIONS", defaults.warm_versions),
        }
    }
}

// ============================================================================
// AGGREGATE
// ============================================================================

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TermBridgeConfig {
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub feed: FeedMonitorConfig,
    pub identity: IdentityConfig,
}

impl TermBridgeConfig {
    pub fn from_env() -> Self {
        Self {
            upstream: UpstreamConfig::from_env(),
            cache: CacheConfig::from_env(),
            feed: FeedMonitorConfig::from_env(),
            identity: IdentityConfig::from_env(),
        }
    }

    /// Validate every section, returning the first failure.
    pub fn validate(&self) -> TermBridgeResult<()> {
        self.upstream.validate()?;
        self.cache.validate()?;
        self.feed.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TermBridgeError;

    fn valid_config() -> TermBridgeConfig {
        TermBridgeConfig {
            upstream: UpstreamConfig {
                api_key: "secret".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = TermBridgeConfig::default();
        assert_eq!(config.cache.volatile_capacity, 25);
        assert_eq!(config.feed.check_interval, Duration::from_secs(3600));
        assert!(config.identity.warm_on_startup);
        assert!(config.feed.feed_url.is_none());
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_missing_api_key_rejected() {
        let config = TermBridgeConfig::default();
        let err = config.validate().expect_err("api key is required");
        assert!(matches!(
            err,
            TermBridgeError::Config(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let mut config = valid_config();
        config.cache.volatile_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = valid_config();
        config.feed.check_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_api_key_redacted_in_debug() {
        let config = valid_config();
        let debug = format!("{:?}", config.upstream);
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_redact_api_key() {
        assert_eq!(
            redact_api_key("http://host/ontologies?apikey=abc123&pagesize=5"),
            "http://host/ontologies?apikey=[REDACTED]&pagesize=5"
        );
        assert_eq!(redact_api_key("http://host/views"), "http://host/views");
    }

    #[test]
    fn test_backoff_growth_is_capped() {
        let retry = RetryConfig {
            max_retries: 5,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(350),
            backoff_multiplier: 2.0,
        };
        assert_eq!(retry.backoff_for(1), Duration::from_millis(100));
        assert_eq!(retry.backoff_for(2), Duration::from_millis(200));
        assert_eq!(retry.backoff_for(3), Duration::from_millis(350));
        assert_eq!(RetryConfig::none().backoff_for(4), Duration::ZERO);
    }
}
