//! TermBridge Core - Entity Type Definitions
//!
//! Pure data types shared by every termbridge crate. No I/O happens here;
//! the storage, upstream and identity crates build on these types.

pub mod config;
pub mod error;
pub mod identity;
pub mod record;

pub use config::{
    redact_api_key, CacheConfig, FeedMonitorConfig, IdentityConfig, RetryConfig, TermBridgeConfig,
    UpstreamConfig, DEFAULT_CHANGE_CHANNEL_CAPACITY, DEFAULT_FEED_CHECK_INTERVAL_SECS,
    DEFAULT_VOLATILE_CAPACITY,
};
pub use error::{
    ConfigError, ErrorKind, ResolveError, StorageError, TermBridgeError, TermBridgeResult,
    UpstreamError,
};
pub use identity::{
    normalize_segment, LookupKind, OntologyId, OntologyVersionId, ResourceKind, ResourceName,
    VersionName,
};
pub use record::{EntityPage, EntityRecord, OntologyRecord, SearchHit};
