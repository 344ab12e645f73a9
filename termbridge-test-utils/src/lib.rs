//! TermBridge Test Utilities
//!
//! Shared test infrastructure for the termbridge workspace:
//! - Fakes for the upstream catalog, the response fetcher and the change feed
//! - Proptest generators for upstream records
//! - Fixtures for the common naming scenarios
//! - Custom assertions on error kinds

pub use termbridge_core::{
    ErrorKind, OntologyId, OntologyRecord, OntologyVersionId, ResourceKind, ResourceName,
    TermBridgeError, TermBridgeResult, UpstreamError, VersionName,
};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use termbridge_storage::ResponseFetcher;
use termbridge_upstream::{ChangeFeedSource, FeedEntry, OntologyCatalog};

// ============================================================================
// FAKE CATALOG
// ============================================================================

#[derive(Debug, Default)]
struct CatalogData {
    latest: HashMap<String, OntologyRecord>,
    versions: HashMap<String, Vec<OntologyRecord>>,
    hidden: HashMap<String, OntologyRecord>,
    private: HashSet<String>,
    broken_versions: HashSet<String>,
}

/// In-memory [`OntologyCatalog`].
///
/// Unknown ids answer with `UpstreamError::NotFound`, private ids with
/// `UpstreamError::PrivateResource`. Every call is counted.
#[derive(Debug, Default)]
pub struct FakeCatalog {
    data: Mutex<CatalogData>,
    calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn data(&self) -> std::sync::MutexGuard<'_, CatalogData> {
        self.data.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the latest submission of the record's ontology.
    pub fn add_latest(&self, record: OntologyRecord) {
        self.data()
            .latest
            .insert(record.ontology_id.clone(), record);
    }

    /// Set the bulk version listing of one ontology.
    pub fn add_versions(&self, ontology_id: &str, records: Vec<OntologyRecord>) {
        self.data()
            .versions
            .insert(ontology_id.to_string(), records);
    }

    /// A submission reachable by id but absent from bulk listings.
    pub fn add_hidden_version(&self, record: OntologyRecord) {
        self.data().hidden.insert(record.version_id.clone(), record);
    }

    /// Every call about this ontology fails with `PrivateResource`.
    pub fn mark_private(&self, ontology_id: &str) {
        self.data().private.insert(ontology_id.to_string());
    }

    /// The version listing of this ontology fails with a transport error.
    pub fn fail_versions_with_transport(&self, ontology_id: &str) {
        self.data()
            .broken_versions
            .insert(ontology_id.to_string());
    }

    /// Total number of catalog calls so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn check_private(data: &CatalogData, ontology_id: &str, url: &str) -> TermBridgeResult<()> {
        if data.private.contains(ontology_id) {
            return Err(UpstreamError::PrivateResource {
                url: url.to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn not_found(url: String) -> TermBridgeError {
    UpstreamError::NotFound { url }.into()
}

#[async_trait]
impl OntologyCatalog for FakeCatalog {
    async fn list_latest(&self, kind: ResourceKind) -> TermBridgeResult<Vec<OntologyRecord>> {
        self.record_call();
        let data = self.data();
        let mut records: Vec<OntologyRecord> = data
            .latest
            .values()
            .filter(|r| r.kind() == kind && !data.private.contains(&r.ontology_id))
            .cloned()
            .collect();
        records.sort_by(|a, b| a.ontology_id.cmp(&b.ontology_id));
        Ok(records)
    }

    async fn get_latest(&self, id: &OntologyId) -> TermBridgeResult<OntologyRecord> {
        self.record_call();
        let url = format!("fake://virtual/ontology/{id}");
        let data = self.data();
        Self::check_private(&data, id.as_str(), &url)?;
        data.latest
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| not_found(url))
    }

    async fn list_versions(&self, id: &OntologyId) -> TermBridgeResult<Vec<OntologyRecord>> {
        self.record_call();
        let url = format!("fake://ontologies/versions/{id}");
        let data = self.data();
        Self::check_private(&data, id.as_str(), &url)?;
        if data.broken_versions.contains(id.as_str()) {
            return Err(UpstreamError::Transport {
                url,
                reason: "connection reset".to_string(),
            }
            .into());
        }
        data.versions
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| not_found(url))
    }

    async fn get_version(
        &self,
        version_id: &OntologyVersionId,
    ) -> TermBridgeResult<OntologyRecord> {
        self.record_call();
        let url = format!("fake://ontologies/{version_id}");
        let data = self.data();
        let found = data
            .hidden
            .get(version_id.as_str())
            .or_else(|| {
                data.versions
                    .values()
                    .flatten()
                    .chain(data.latest.values())
                    .find(|r| r.version_id == version_id.as_str())
            })
            .cloned()
            .ok_or_else(|| not_found(url.clone()))?;
        Self::check_private(&data, &found.ontology_id, &url)?;
        Ok(found)
    }
}

// ============================================================================
// COUNTING FETCHER
// ============================================================================

/// [`ResponseFetcher`] serving fixed bodies and counting calls per URL.
#[derive(Debug, Default)]
pub struct CountingFetcher {
    bodies: Mutex<HashMap<String, String>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl CountingFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, url: impl Into<String>, body: impl Into<String>) -> Self {
        self.set_body(url, body);
        self
    }

    pub fn set_body(&self, url: impl Into<String>, body: impl Into<String>) {
        self.bodies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.into(), body.into());
    }

    /// Calls made for one URL.
    pub fn calls_for(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// Calls made for every URL.
    pub fn total_calls(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum()
    }
}

#[async_trait]
impl ResponseFetcher for CountingFetcher {
    async fn fetch(&self, url: &str) -> TermBridgeResult<Option<String>> {
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(url.to_string())
            .or_default() += 1;
        self.bodies
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
            .map(Some)
            .ok_or_else(|| not_found(url.to_string()))
    }
}

// ============================================================================
// FAKE CHANGE FEED
// ============================================================================

/// [`ChangeFeedSource`] serving a scripted list of entries.
#[derive(Debug, Default)]
pub struct FakeChangeFeed {
    entries: Mutex<Vec<FeedEntry>>,
    failing: Mutex<bool>,
    fetches: AtomicUsize,
}

impl FakeChangeFeed {
    pub fn new(entries: Vec<FeedEntry>) -> Self {
        Self {
            entries: Mutex::new(entries),
            ..Default::default()
        }
    }

    pub fn set_entries(&self, entries: Vec<FeedEntry>) {
        *self.entries.lock().unwrap_or_else(|e| e.into_inner()) = entries;
    }

    /// Make subsequent fetches fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChangeFeedSource for FakeChangeFeed {
    async fn fetch_entries(&self) -> TermBridgeResult<Vec<FeedEntry>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(UpstreamError::Transport {
                url: "fake://feed".to_string(),
                reason: "feed unavailable".to_string(),
            }
            .into());
        }
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for upstream records.

    use super::*;
    use proptest::prelude::*;

    /// Declared version strings, drawn from a small pool so that batches
    /// regularly contain duplicates and placeholders.
    pub fn arb_declared_version() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some("unknown".to_string())),
            Just(Some(String::new())),
            Just(Some("3.2.1".to_string())),
            Just(Some("2011 AA".to_string())),
            Just(Some("2".to_string())),
            Just(Some("2 OWL".to_string())),
            "[0-9]{1,2}(\\.[0-9]{1,2}){0,2}".prop_map(Some),
            "v[a-z0-9./]{1,6}".prop_map(Some),
        ]
    }

    pub fn arb_format() -> impl Strategy<Value = Option<String>> {
        prop_oneof![
            Just(None),
            Just(Some("OWL".to_string())),
            Just(Some("OBO".to_string())),
            Just(Some("RRF 2.0".to_string())),
        ]
    }

    /// All submissions of one ontology: distinct numeric version ids, a
    /// format drawn per submission.
    pub fn arb_version_batch() -> impl Strategy<Value = Vec<OntologyRecord>> {
        (
            proptest::collection::vec((arb_declared_version(), arb_format()), 1..8),
            1u64..100_000,
        )
            .prop_map(|(members, first_id)| {
                members
                    .into_iter()
                    .enumerate()
                    .map(|(i, (version, format))| OntologyRecord {
                        ontology_id: "1000".to_string(),
                        version_id: (first_id + i as u64).to_string(),
                        abbreviation: Some("ONT".to_string()),
                        display_label: None,
                        version_number: version,
                        format,
                        is_view: false,
                    })
                    .collect()
            })
    }

    /// Resource abbreviations, some of which need normalization.
    pub fn arb_abbreviation() -> impl Strategy<Value = String> {
        "[A-Z][A-Z0-9]{1,6}( [A-Z]{1,3})?(\\.[0-9])?"
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Records for the common naming scenarios.

    use super::*;

    /// One submission record.
    pub fn submission(
        ontology_id: &str,
        version_id: &str,
        abbreviation: &str,
        version: Option<&str>,
        format: Option<&str>,
    ) -> OntologyRecord {
        OntologyRecord {
            ontology_id: ontology_id.to_string(),
            version_id: version_id.to_string(),
            abbreviation: Some(abbreviation.to_string()),
            display_label: None,
            version_number: version.map(str::to_string),
            format: format.map(str::to_string),
            is_view: false,
        }
    }

    /// ICD10: two submissions both declaring "3.2.1".
    pub fn icd10_batch() -> Vec<OntologyRecord> {
        vec![
            submission("1104", "44450", "ICD10", Some("3.2.1"), None),
            submission("1104", "44451", "ICD10", Some("3.2.1"), None),
        ]
    }

    /// FOO: a single submission declaring "unknown".
    pub fn foo_batch() -> Vec<OntologyRecord> {
        vec![submission("2001", "60001", "FOO", Some("unknown"), None)]
    }

    /// Feed entry for an ontology at a fixed timestamp.
    pub fn feed_entry(ontology_id: &str, published: chrono::DateTime<chrono::Utc>) -> FeedEntry {
        FeedEntry::new(
            published,
            format!("http://bioportal.example.org/ontologies/{ontology_id}"),
        )
    }

    /// A scratch directory for an LMDB environment.
    pub fn temp_cache_dir() -> tempfile::TempDir {
        tempfile::TempDir::new().expect("TempDir creation should succeed")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on termbridge error kinds.

    use super::*;

    /// Assert that a result failed with the given kind.
    #[track_caller]
    pub fn assert_error_kind<T: std::fmt::Debug>(result: &TermBridgeResult<T>, kind: ErrorKind) {
        match result {
            Err(e) => assert_eq!(e.kind(), kind, "unexpected error: {e}"),
            Ok(value) => panic!("Expected {kind:?} error, got Ok({value:?})"),
        }
    }

    /// Assert that a result is a terminal `NotFound`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &TermBridgeResult<T>) {
        assert_error_kind(result, ErrorKind::NotFound);
    }
}
