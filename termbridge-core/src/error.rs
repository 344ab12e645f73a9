//! Error types for termbridge operations

use crate::identity::LookupKind;
use thiserror::Error;

/// Identity resolution errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("No mapping for {kind:?} '{key}'")]
    NotFound { kind: LookupKind, key: String },

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("Invariant violation: {reason}")]
    InvariantViolation { reason: String },
}

/// Upstream repository errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpstreamError {
    #[error("Upstream resource is private: {url}")]
    PrivateResource { url: String },

    #[error("Upstream resource not found: {url}")]
    NotFound { url: String },

    #[error("Upstream request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    #[error("Invalid upstream response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

/// Response cache and watermark storage errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Failed to open store at {path}: {reason}")]
    OpenFailed { path: String, reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Serialization failed: {reason}")]
    Serialization { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all termbridge errors.
#[derive(Debug, Clone, Error)]
pub enum TermBridgeError {
    #[error("Resolve error: {0}")]
    Resolve(#[from] ResolveError),

    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for termbridge operations.
pub type TermBridgeResult<T> = Result<T, TermBridgeError>;

/// The failure kinds callers render.
///
/// Every [`TermBridgeError`] maps to exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No mapping after exhausting every fallback.
    NotFound,
    /// The upstream denies access; render as "forbidden", not "missing".
    PrivateResource,
    /// Network, parse, or local I/O failure; retried at the next natural miss.
    TransportError,
    /// A caller bug. Fatal.
    InvariantViolation,
}

impl TermBridgeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TermBridgeError::Resolve(ResolveError::NotFound { .. })
            | TermBridgeError::Resolve(ResolveError::InvalidName { .. })
            | TermBridgeError::Upstream(UpstreamError::NotFound { .. }) => ErrorKind::NotFound,
            TermBridgeError::Resolve(ResolveError::InvariantViolation { .. }) => {
                ErrorKind::InvariantViolation
            }
            TermBridgeError::Upstream(UpstreamError::PrivateResource { .. }) => {
                ErrorKind::PrivateResource
            }
            TermBridgeError::Upstream(UpstreamError::Transport { .. })
            | TermBridgeError::Upstream(UpstreamError::InvalidResponse { .. })
            | TermBridgeError::Storage(_)
            | TermBridgeError::Config(_) => ErrorKind::TransportError,
        }
    }

    /// Shorthand for a terminal resolution miss.
    pub fn not_found(kind: LookupKind, key: impl Into<String>) -> Self {
        ResolveError::NotFound {
            kind,
            key: key.into(),
        }
        .into()
    }

    /// True when the upstream reported the resource as absent.
    pub fn is_upstream_not_found(&self) -> bool {
        matches!(self, TermBridgeError::Upstream(UpstreamError::NotFound { .. }))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_error_display_not_found() {
        let err = ResolveError::NotFound {
            kind: LookupKind::VersionName,
            key: "ICD10_44450".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("No mapping"));
        assert!(msg.contains("VersionName"));
        assert!(msg.contains("ICD10_44450"));
    }

    #[test]
    fn test_upstream_error_display_private() {
        let err = UpstreamError::PrivateResource {
            url: "http://upstream/ontologies/1".to_string(),
        };
        assert!(format!("{}", err).contains("private"));
    }

    #[test]
    fn test_error_kind_mapping() {
        let cases = [
            (
                TermBridgeError::not_found(LookupKind::OntologyId, "X"),
                ErrorKind::NotFound,
            ),
            (
                UpstreamError::NotFound { url: "u".into() }.into(),
                ErrorKind::NotFound,
            ),
            (
                UpstreamError::PrivateResource { url: "u".into() }.into(),
                ErrorKind::PrivateResource,
            ),
            (
                UpstreamError::Transport {
                    url: "u".into(),
                    reason: "reset".into(),
                }
                .into(),
                ErrorKind::TransportError,
            ),
            (
                UpstreamError::InvalidResponse {
                    url: "u".into(),
                    reason: "eof".into(),
                }
                .into(),
                ErrorKind::TransportError,
            ),
            (
                ResolveError::InvariantViolation {
                    reason: "no backfill".into(),
                }
                .into(),
                ErrorKind::InvariantViolation,
            ),
            (StorageError::LockPoisoned.into(), ErrorKind::TransportError),
        ];

        for (err, expected) in cases {
            assert_eq!(err.kind(), expected, "{err}");
        }
    }

    #[test]
    fn test_is_upstream_not_found() {
        let err: TermBridgeError = UpstreamError::NotFound { url: "u".into() }.into();
        assert!(err.is_upstream_not_found());
        let err = TermBridgeError::not_found(LookupKind::OntologyId, "X");
        assert!(!err.is_upstream_not_found());
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "volatile_capacity".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("volatile_capacity"));
        assert!(msg.contains("must be positive"));
    }
}
