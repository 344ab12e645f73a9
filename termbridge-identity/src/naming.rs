//! Version naming.
//!
//! A version name is `<resource name>[_<disambiguator>][_<format>]`. The
//! disambiguator is the submitter's declared version string when every
//! submission in the batch declares a different one and no two of the
//! resulting names coincide, and the upstream submission id otherwise.
//! Uniqueness is a property of the whole batch: one repeated declared
//! version, or one pair of names equal once the format suffix is appended,
//! switches every member to its id.

use std::collections::HashSet;

use termbridge_core::{
    normalize_segment, OntologyId, OntologyRecord, OntologyVersionId, ResourceName, VersionName,
};

/// One submission with its derived names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedVersion {
    pub ontology_id: OntologyId,
    pub version_id: OntologyVersionId,
    pub resource_name: ResourceName,
    pub version_name: VersionName,
    /// The segment that distinguishes this submission, already normalized.
    /// `None` when a unique batch member declared no version.
    pub disambiguator: Option<String>,
    /// The declared version as published, placeholders included.
    pub official_version: Option<String>,
}

/// True when no two records declare the same version.
///
/// Absent declarations compare equal to each other, and declarations are
/// compared after normalization since that is what ends up in the name.
pub fn declared_versions_unique(records: &[OntologyRecord]) -> bool {
    let mut seen = HashSet::with_capacity(records.len());
    records
        .iter()
        .all(|record| seen.insert(record.declared_version().map(normalize_segment)))
}

/// Name one submission.
///
/// `by_version_id` selects the submission id as disambiguator instead of
/// the declared version.
pub fn name_version(
    resource_name: &ResourceName,
    record: &OntologyRecord,
    by_version_id: bool,
) -> NamedVersion {
    let disambiguator = if by_version_id {
        Some(normalize_segment(&record.version_id))
    } else {
        record.declared_version().map(normalize_segment)
    }
    .filter(|d| !d.is_empty());
    let format = record.format_suffix();

    let version_name = VersionName::from_segments(
        std::iter::once(resource_name.as_str())
            .chain(disambiguator.as_deref())
            .chain(format.as_deref()),
    );

    NamedVersion {
        ontology_id: record.ontology_id(),
        version_id: record.version_id(),
        resource_name: resource_name.clone(),
        version_name,
        disambiguator,
        official_version: record.official_version().map(str::to_string),
    }
}

/// Name every submission of one ontology.
///
/// The batch must be complete: uniqueness is decided over all of it before
/// any member is named.
pub fn name_version_batch(
    resource_name: &ResourceName,
    records: &[OntologyRecord],
) -> Vec<NamedVersion> {
    if declared_versions_unique(records) {
        let named: Vec<NamedVersion> = records
            .iter()
            .map(|record| name_version(resource_name, record, false))
            .collect();
        let mut seen = HashSet::with_capacity(named.len());
        if named.iter().all(|n| seen.insert(&n.version_name)) {
            return named;
        }
    }
    records
        .iter()
        .map(|record| name_version(resource_name, record, true))
        .collect()
}
