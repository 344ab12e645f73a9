//! Catalog access routed through the response cache.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use termbridge_core::{
    redact_api_key, EntityPage, OntologyId, OntologyRecord, OntologyVersionId, ResourceKind,
    SearchHit, TermBridgeResult, UpstreamError,
};
use termbridge_storage::{CacheTier, ResponseCache, ResponseFetcher};
use tracing::{debug, warn};

use crate::urls::UpstreamUrls;

/// Read access to the upstream ontology catalog.
///
/// Errors follow the upstream's typed outcomes: a missing resource is
/// [`UpstreamError::NotFound`], a private one
/// [`UpstreamError::PrivateResource`].
#[async_trait]
pub trait OntologyCatalog: Send + Sync {
    /// Latest submission of every ontology of `kind`.
    async fn list_latest(&self, kind: ResourceKind) -> TermBridgeResult<Vec<OntologyRecord>>;

    /// Latest submission of one ontology.
    async fn get_latest(&self, id: &OntologyId) -> TermBridgeResult<OntologyRecord>;

    /// Every submission of one ontology visible in bulk listings.
    async fn list_versions(&self, id: &OntologyId) -> TermBridgeResult<Vec<OntologyRecord>>;

    /// One submission by id, including ones hidden from bulk listings.
    async fn get_version(&self, version_id: &OntologyVersionId)
        -> TermBridgeResult<OntologyRecord>;
}

#[async_trait]
impl<T: OntologyCatalog + ?Sized> OntologyCatalog for Arc<T> {
    async fn list_latest(&self, kind: ResourceKind) -> TermBridgeResult<Vec<OntologyRecord>> {
        (**self).list_latest(kind).await
    }

    async fn get_latest(&self, id: &OntologyId) -> TermBridgeResult<OntologyRecord> {
        (**self).get_latest(id).await
    }

    async fn list_versions(&self, id: &OntologyId) -> TermBridgeResult<Vec<OntologyRecord>> {
        (**self).list_versions(id).await
    }

    async fn get_version(
        &self,
        version_id: &OntologyVersionId,
    ) -> TermBridgeResult<OntologyRecord> {
        (**self).get_version(version_id).await
    }
}

/// Catalog client backed by the two-tier response cache.
///
/// Listings and details go through the persistent tier; entity listings
/// and search through the volatile tier.
pub struct CatalogClient {
    cache: Arc<ResponseCache>,
    fetcher: Arc<dyn ResponseFetcher>,
    urls: UpstreamUrls,
}

impl CatalogClient {
    pub fn new(
        cache: Arc<ResponseCache>,
        fetcher: Arc<dyn ResponseFetcher>,
        urls: UpstreamUrls,
    ) -> Self {
        Self {
            cache,
            fetcher,
            urls,
        }
    }

    pub fn urls(&self) -> &UpstreamUrls {
        &self.urls
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.cache
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        tier: CacheTier,
    ) -> TermBridgeResult<T> {
        let body = self
            .cache
            .get_or_fetch(url, tier, self.fetcher.as_ref())
            .await?;
        match serde_json::from_str(&body) {
            Ok(value) => Ok(value),
            Err(e) => {
                // A body that cannot be parsed must not be served again.
                if let Err(purge_err) = self.cache.discard(url, tier) {
                    warn!(url = %redact_api_key(url), ?tier, error = %purge_err, "Failed to discard unparseable response");
                }
                Err(UpstreamError::InvalidResponse {
                    url: redact_api_key(url),
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    /// One page of entities of a submission.
    pub async fn list_entities(
        &self,
        version_id: &OntologyVersionId,
        page_size: u32,
        page: u32,
    ) -> TermBridgeResult<EntityPage> {
        let url = self.urls.list_entities(version_id, page_size, page);
        self.get_json(&url, CacheTier::Volatile).await
    }

    /// Search entities by text, optionally restricted to some ontologies.
    pub async fn search_entities(
        &self,
        query: &str,
        ontology_ids: &[OntologyId],
    ) -> TermBridgeResult<Vec<SearchHit>> {
        let url = self.urls.search_entities(query, ontology_ids);
        self.get_json(&url, CacheTier::Volatile).await
    }

    /// Purge every persistent-tier entry describing ontology `id`.
    ///
    /// Returns how many entries were present.
    pub fn invalidate(&self, id: &OntologyId) -> TermBridgeResult<usize> {
        let mut purged = 0;
        for url in self.urls.invalidation_urls(id) {
            if self.cache.purge(&url)? {
                purged += 1;
            }
        }
        debug!(ontology_id = %id, purged, "Invalidated cached listings");
        Ok(purged)
    }
}

#[async_trait]
impl OntologyCatalog for CatalogClient {
    async fn list_latest(&self, kind: ResourceKind) -> TermBridgeResult<Vec<OntologyRecord>> {
        let url = self.urls.list_latest(kind);
        let mut records: Vec<OntologyRecord> = self.get_json(&url, CacheTier::Persistent).await?;
        // The views listing does not always flag its members.
        if kind == ResourceKind::ValueSet {
            for record in &mut records {
                record.is_view = true;
            }
        }
        Ok(records)
    }

    async fn get_latest(&self, id: &OntologyId) -> TermBridgeResult<OntologyRecord> {
        let url = self.urls.get_latest(id);
        self.get_json(&url, CacheTier::Persistent).await
    }

    async fn list_versions(&self, id: &OntologyId) -> TermBridgeResult<Vec<OntologyRecord>> {
        let url = self.urls.list_versions(id);
        self.get_json(&url, CacheTier::Persistent).await
    }

    async fn get_version(
        &self,
        version_id: &OntologyVersionId,
    ) -> TermBridgeResult<OntologyRecord> {
        let url = self.urls.get_version(version_id);
        self.get_json(&url, CacheTier::Persistent).await
    }
}

impl std::fmt::Debug for CatalogClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogClient")
            .field("urls", &self.urls)
            .finish_non_exhaustive()
    }
}
