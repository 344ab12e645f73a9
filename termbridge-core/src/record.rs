//! Upstream record types.
//!
//! These mirror the JSON bodies returned by the upstream catalog. Ids arrive
//! as either JSON strings or numbers depending on the endpoint, so they are
//! read through [`flexible_id`].

use serde::{Deserialize, Deserializer, Serialize};

use crate::identity::{
    normalize_segment, OntologyId, OntologyVersionId, ResourceKind, ResourceName,
};

/// Declared version strings the upstream uses when no version was given.
const ABSENT_VERSION_MARKERS: &[&str] = &["unknown"];

/// Metadata for one submission (version) of an ontology or view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntologyRecord {
    /// Logical ontology id, shared by every submission.
    #[serde(deserialize_with = "flexible_id")]
    pub ontology_id: String,
    /// Submission id.
    #[serde(rename = "id", deserialize_with = "flexible_id")]
    pub version_id: String,
    #[serde(default)]
    pub abbreviation: Option<String>,
    #[serde(default)]
    pub display_label: Option<String>,
    /// Version string declared by the submitter. Not unique.
    #[serde(default)]
    pub version_number: Option<String>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub is_view: bool,
}

impl OntologyRecord {
    pub fn ontology_id(&self) -> OntologyId {
        OntologyId::new(self.ontology_id.clone())
    }

    pub fn version_id(&self) -> OntologyVersionId {
        OntologyVersionId::new(self.version_id.clone())
    }

    pub fn kind(&self) -> ResourceKind {
        if self.is_view {
            ResourceKind::ValueSet
        } else {
            ResourceKind::CodeSystem
        }
    }

    /// Human-legible name: the abbreviation when present, else the display
    /// label, else the ontology id itself.
    pub fn resource_name(&self) -> ResourceName {
        let raw = non_blank(self.abbreviation.as_deref())
            .or_else(|| non_blank(self.display_label.as_deref()))
            .unwrap_or(&self.ontology_id);
        ResourceName::new(raw)
    }

    /// The declared version string, or `None` when blank or a known
    /// placeholder such as `"unknown"`.
    pub fn declared_version(&self) -> Option<&str> {
        non_blank(self.version_number.as_deref()).filter(|v| {
            !ABSENT_VERSION_MARKERS
                .iter()
                .any(|marker| v.eq_ignore_ascii_case(marker))
        })
    }

    /// The declared version as the upstream wrote it (trimmed), placeholders
    /// included. This is the "official version" callers may quote back.
    pub fn official_version(&self) -> Option<&str> {
        non_blank(self.version_number.as_deref())
    }

    /// Format suffix, normalized for use in a version name.
    pub fn format_suffix(&self) -> Option<String> {
        non_blank(self.format.as_deref()).map(normalize_segment)
    }
}

/// One entity (concept) as returned by an entity listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord {
    pub id: String,
    #[serde(default)]
    pub full_id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
}

/// A page of entities for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPage {
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub page_count: u32,
    #[serde(default)]
    pub entities: Vec<EntityRecord>,
}

/// One search match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    #[serde(deserialize_with = "flexible_id")]
    pub ontology_id: String,
    #[serde(rename = "ontologyVersionId", deserialize_with = "flexible_id")]
    pub version_id: String,
    pub concept_id: String,
    #[serde(default)]
    pub preferred_name: Option<String>,
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Accept an id written either as a JSON string or a JSON integer.
pub fn flexible_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Text(String),
        Number(u64),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Text(text) => text,
        RawId::Number(number) => number.to_string(),
    })
}
