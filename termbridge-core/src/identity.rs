//! Identity types for upstream ontologies and their human-legible names.
//!
//! Upstream ids are opaque strings; names are derived from upstream metadata
//! and must stay URL-safe. The newtypes here keep the four id/name spaces
//! from being mixed up at call sites.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ResolveError;

macro_rules! string_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Borrow the underlying string.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper and return the underlying string.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_newtype!(
    /// Opaque upstream id for one logical ontology or view.
    OntologyId
);

string_newtype!(
    /// Opaque upstream id for one submission (version) of an ontology.
    OntologyVersionId
);

string_newtype!(
    /// Human-legible name of an ontology, unique within its [`ResourceKind`].
    ResourceName
);

string_newtype!(
    /// Disambiguated, URL-safe name of one submission. Never contains `.`.
    VersionName
);

impl OntologyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl OntologyVersionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a number, when the upstream assigned a numeric id.
    ///
    /// Upstream version ids are allocated from a single increasing sequence,
    /// so numeric order is creation order.
    pub fn numeric(&self) -> Option<u64> {
        self.0.parse().ok()
    }
}

impl ResourceName {
    /// Build a resource name from raw upstream text, normalizing it into a
    /// URL-safe segment.
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(normalize_segment(raw.as_ref()))
    }
}

impl VersionName {
    /// Validate an externally supplied version name.
    ///
    /// Names produced by this crate are normalized before construction, so a
    /// period can only arrive from a caller.
    pub fn parse(raw: impl Into<String>) -> Result<Self, ResolveError> {
        let raw = raw.into();
        if raw.is_empty() {
            return Err(ResolveError::InvalidName {
                name: raw,
                reason: "version name must not be empty".to_string(),
            });
        }
        if raw.contains('.') {
            return Err(ResolveError::InvalidName {
                name: raw,
                reason: "version name must not contain '.'".to_string(),
            });
        }
        Ok(Self(raw))
    }

    /// Assemble a version name from already-normalized segments joined by `_`.
    pub fn from_segments<'a>(segments: impl IntoIterator<Item = &'a str>) -> Self {
        let joined = segments
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(normalize_segment)
            .collect::<Vec<_>>()
            .join("_");
        Self(joined)
    }
}

/// Normalize one name segment so it is URL-safe and period-free.
///
/// Whitespace runs collapse to `_`; `.` and `/` become `-`.
pub fn normalize_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            pending_space = true;
            continue;
        }
        if pending_space {
            out.push('_');
            pending_space = false;
        }
        match ch {
            '.' | '/' => out.push('-'),
            other => out.push(other),
        }
    }
    out
}

/// Which upstream catalog an ontology id belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    /// A terminology or code system (upstream "ontology").
    CodeSystem,
    /// A value set (upstream "view").
    ValueSet,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 2] = [ResourceKind::CodeSystem, ResourceKind::ValueSet];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::CodeSystem => "code_system",
            ResourceKind::ValueSet => "value_set",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a failed identity lookup was looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LookupKind {
    CodeSystemName,
    ValueSetName,
    OntologyId,
    VersionName,
    OntologyVersionId,
}

impl LookupKind {
    /// The name lookup for a resource kind.
    pub fn name_of(kind: ResourceKind) -> Self {
        match kind {
            ResourceKind::CodeSystem => LookupKind::CodeSystemName,
            ResourceKind::ValueSet => LookupKind::ValueSetName,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_normalize_segment_replaces_periods() {
        assert_eq!(normalize_segment("3.2.1"), "3-2-1");
        assert_eq!(normalize_segment("  Gene   Ontology "), "Gene_Ontology");
        assert_eq!(normalize_segment("2011/AA"), "2011-AA");
    }

    #[test]
    fn test_version_name_parse_rejects_period() {
        assert!(VersionName::parse("ICD10_3.2.1").is_err());
        assert!(VersionName::parse("").is_err());
        let name = VersionName::parse("ICD10_44450").expect("valid name");
        assert_eq!(name.as_str(), "ICD10_44450");
    }

    #[test]
    fn test_version_name_from_segments_skips_empty() {
        let name = VersionName::from_segments(["FOO", "", "OWL"]);
        assert_eq!(name.as_str(), "FOO_OWL");
    }

    #[test]
    fn test_version_id_numeric() {
        assert_eq!(OntologyVersionId::new("44450").numeric(), Some(44450));
        assert_eq!(OntologyVersionId::new("abc").numeric(), None);
    }

    #[test]
    fn test_transparent_serde() {
        let id = OntologyId::new("1104");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"1104\"");
    }

    proptest! {
        #[test]
        fn prop_normalized_segment_has_no_period(raw in ".{0,40}") {
            prop_assert!(!normalize_segment(&raw).contains('.'));
        }

        #[test]
        fn prop_from_segments_has_no_period(a in ".{0,20}", b in ".{0,20}") {
            let name = VersionName::from_segments([a.as_str(), b.as_str()]);
            prop_assert!(!name.as_str().contains('.'));
        }
    }
}
