//! Identity resolution against the upstream catalog.
//!
//! Every `resolve_*` operation reads the [`IdentityStore`] first. On a miss
//! it refreshes from upstream with the strategies listed in its docs and
//! retries once per strategy. Single-item operations propagate the first
//! upstream failure other than "not found"; bulk operations (`warm`,
//! `refresh_changed`) log and skip per-item failures.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use termbridge_core::{
    normalize_segment, IdentityConfig, LookupKind, OntologyId, OntologyRecord, OntologyVersionId,
    ResolveError, ResourceKind, ResourceName, TermBridgeError, TermBridgeResult, VersionName,
};
use termbridge_upstream::OntologyCatalog;
use tracing::{debug, info, warn};

use crate::naming::{name_version, name_version_batch};
use crate::refresh::{resolve_with_refresh, RefreshStrategy, Refresher};
use crate::store::IdentityStore;

/// Result of [`IdentityResolver::warm`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarmSummary {
    pub resources: usize,
    pub versions: usize,
    pub failures: usize,
}

/// Result of [`IdentityResolver::repair_staleness`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// Highest numeric version id known before the pass.
    pub floor: Option<u64>,
    /// Latest submissions newer than `floor`.
    pub discovered: usize,
    /// Of those, how many are now named.
    pub backfilled: usize,
}

pub struct IdentityResolver<C> {
    catalog: C,
    store: Arc<IdentityStore>,
    config: IdentityConfig,
}

impl<C: OntologyCatalog> IdentityResolver<C> {
    pub fn new(catalog: C, store: Arc<IdentityStore>, config: IdentityConfig) -> Self {
        Self {
            catalog,
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<IdentityStore> {
        &self.store
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    // ========================================================================
    // RESOLUTION
    // ========================================================================

    /// Name of a code system.
    ///
    /// On miss: fetches the ontology's latest submission and its version
    /// list, then retries.
    pub async fn resolve_code_system_name(&self, id: &OntologyId) -> TermBridgeResult<ResourceName> {
        self.resolve_resource_name(ResourceKind::CodeSystem, id).await
    }

    /// Name of a value set. Same miss behaviour as
    /// [`resolve_code_system_name`](Self::resolve_code_system_name).
    pub async fn resolve_value_set_name(&self, id: &OntologyId) -> TermBridgeResult<ResourceName> {
        self.resolve_resource_name(ResourceKind::ValueSet, id).await
    }

    async fn resolve_resource_name(
        &self,
        kind: ResourceKind,
        id: &OntologyId,
    ) -> TermBridgeResult<ResourceName> {
        resolve_with_refresh(
            || self.store.resource_name(kind, id),
            self,
            &[RefreshStrategy::SingleOntology(kind, id.clone())],
            || TermBridgeError::not_found(LookupKind::name_of(kind), id.as_str()),
        )
        .await
    }

    /// Ontology id for a resource name, code systems first.
    ///
    /// Cache only: there is no upstream search by name.
    pub fn resolve_ontology_id(&self, name: &ResourceName) -> TermBridgeResult<OntologyId> {
        ResourceKind::ALL
            .into_iter()
            .find_map(|kind| self.store.ontology_id(kind, name))
            .ok_or_else(|| TermBridgeError::not_found(LookupKind::OntologyId, name.as_str()))
    }

    /// Ontology id for a resource name of one kind. Cache only.
    pub fn resolve_ontology_id_of_kind(
        &self,
        kind: ResourceKind,
        name: &ResourceName,
    ) -> TermBridgeResult<OntologyId> {
        self.store
            .ontology_id(kind, name)
            .ok_or_else(|| TermBridgeError::not_found(LookupKind::OntologyId, name.as_str()))
    }

    /// Version name of a submission.
    ///
    /// On miss: refreshes the ontology's full version list, then falls back
    /// to fetching the submission directly (covers submissions hidden from
    /// bulk listings).
    pub async fn resolve_version_name(
        &self,
        id: &OntologyId,
        version_id: &OntologyVersionId,
    ) -> TermBridgeResult<VersionName> {
        resolve_with_refresh(
            || self.store.version_name(version_id),
            self,
            &[
                RefreshStrategy::VersionList(id.clone()),
                RefreshStrategy::SingleVersion(version_id.clone()),
            ],
            || TermBridgeError::not_found(LookupKind::VersionName, version_id.as_str()),
        )
        .await
    }

    /// Submission id for a version name.
    ///
    /// On miss: runs one staleness repair pass, then retries.
    pub async fn resolve_ontology_version_id(
        &self,
        name: &VersionName,
    ) -> TermBridgeResult<OntologyVersionId> {
        resolve_with_refresh(
            || self.store.version_id(name),
            self,
            &[RefreshStrategy::StalenessRepair],
            || TermBridgeError::not_found(LookupKind::OntologyVersionId, name.as_str()),
        )
        .await
    }

    /// Version name for a resource name and an upstream "official version".
    ///
    /// The official version may already be a disambiguator (the upstream
    /// reuses submission ids that way), so that index is tried first, then
    /// the declared-version index. A declared version shared by several
    /// submissions matches none of them. On miss: one staleness repair pass.
    ///
    /// Calling this before any version batch was ever recorded is a caller
    /// bug and fails with `InvariantViolation`.
    pub async fn resolve_version_name_for_name_and_official_version_id(
        &self,
        name: &ResourceName,
        official_version_id: &str,
    ) -> TermBridgeResult<VersionName> {
        if !self.store.has_backfilled() {
            return Err(ResolveError::InvariantViolation {
                reason: format!(
                    "version lookup for '{name}' before any version batch was loaded"
                ),
            }
            .into());
        }

        let official = official_version_id.trim();
        let disambiguator = normalize_segment(official);
        resolve_with_refresh(
            || {
                self.store
                    .version_by_disambiguator(name, &disambiguator)
                    .or_else(|| self.store.version_by_official(name, official))
            },
            self,
            &[RefreshStrategy::StalenessRepair],
            || {
                let candidates = self.store.versions_by_official(name, official);
                if candidates.len() > 1 {
                    warn!(
                        resource_name = %name,
                        official_version = official,
                        candidates = candidates.len(),
                        "Official version is shared by several submissions"
                    );
                }
                TermBridgeError::not_found(LookupKind::VersionName, format!("{name}@{official}"))
            },
        )
        .await
    }

    // ========================================================================
    // BULK POPULATION
    // ========================================================================

    /// Best-effort population from the latest listings of both kinds and,
    /// when `warm_versions` is set, every listed ontology's version batch.
    pub async fn warm(&self) -> WarmSummary {
        let mut summary = WarmSummary::default();

        for kind in ResourceKind::ALL {
            let records = match self.catalog.list_latest(kind).await {
                Ok(records) => records,
                Err(e) => {
                    warn!(%kind, error = %e, "Failed to list latest submissions, skipping");
                    summary.failures += 1;
                    continue;
                }
            };

            for record in &records {
                self.store
                    .insert_resource(kind, record.ontology_id(), record.resource_name());
                summary.resources += 1;
            }

            if self.config.warm_versions {
                for record in &records {
                    let id = record.ontology_id();
                    match self.refresh_versions(&id).await {
                        Ok(count) => summary.versions += count,
                        Err(e) => {
                            warn!(ontology_id = %id, error = %e, "Failed to load versions, skipping");
                            summary.failures += 1;
                        }
                    }
                }
            }
        }

        info!(
            resources = summary.resources,
            versions = summary.versions,
            failures = summary.failures,
            "Identity store warmed"
        );
        summary
    }

    /// Best-effort refresh of ontologies reported as changed.
    ///
    /// Returns how many were refreshed.
    pub async fn refresh_changed(&self, ids: &[OntologyId]) -> usize {
        let mut refreshed = 0;
        for id in ids {
            let kind = self
                .store
                .kind_of(id)
                .unwrap_or(ResourceKind::CodeSystem);
            match self.refresh_single_ontology(kind, id).await {
                Ok(()) => refreshed += 1,
                Err(e) => warn!(ontology_id = %id, error = %e, "Failed to refresh changed ontology"),
            }
        }
        debug!(requested = ids.len(), refreshed, "Refreshed changed ontologies");
        refreshed
    }

    /// Global staleness repair.
    ///
    /// Re-reads both latest listings, then names every listed submission
    /// whose id is above the highest id known before the pass, one at a
    /// time in id order. Listing failures propagate; a failure for one
    /// submission is logged and skipped.
    pub async fn repair_staleness(&self) -> TermBridgeResult<RepairSummary> {
        let floor = self.store.max_numeric_version_id();

        let mut discovered: Vec<(Option<u64>, OntologyVersionId, OntologyId)> = Vec::new();
        for kind in ResourceKind::ALL {
            for record in self.catalog.list_latest(kind).await? {
                self.store
                    .insert_resource(kind, record.ontology_id(), record.resource_name());

                let version_id = record.version_id();
                let numeric = version_id.numeric();
                let is_new = match (numeric, floor) {
                    (Some(n), Some(f)) => n > f,
                    (Some(_), None) => true,
                    (None, _) => self.store.version_name(&version_id).is_none(),
                };
                if is_new {
                    discovered.push((numeric, version_id, record.ontology_id()));
                }
            }
        }
        // Non-numeric ids sort last.
        discovered.sort_by_key(|(numeric, _, _)| numeric.unwrap_or(u64::MAX));

        let mut summary = RepairSummary {
            floor,
            discovered: discovered.len(),
            backfilled: 0,
        };
        let mut refreshed_lists: HashSet<OntologyId> = HashSet::new();

        for (_, version_id, ontology_id) in &discovered {
            if self.store.version_name(version_id).is_none()
                && refreshed_lists.insert(ontology_id.clone())
            {
                if let Err(e) = self.refresh_versions(ontology_id).await {
                    warn!(ontology_id = %ontology_id, error = %e, "Backfill of version list failed");
                }
            }
            if self.store.version_name(version_id).is_none() {
                if let Err(e) = self.refresh_single_version(version_id).await {
                    warn!(version_id = %version_id, error = %e, "Backfill of submission failed");
                }
            }
            if self.store.version_name(version_id).is_some() {
                summary.backfilled += 1;
            }
        }

        info!(
            floor = ?summary.floor,
            discovered = summary.discovered,
            backfilled = summary.backfilled,
            "Staleness repair finished"
        );
        Ok(summary)
    }

    // ========================================================================
    // REFRESH PRIMITIVES
    // ========================================================================

    async fn refresh_single_ontology(
        &self,
        kind: ResourceKind,
        id: &OntologyId,
    ) -> TermBridgeResult<()> {
        let record = self.catalog.get_latest(id).await?;
        let kind = if record.is_view {
            ResourceKind::ValueSet
        } else {
            kind
        };
        let name = record.resource_name();
        debug!(ontology_id = %id, %kind, resource_name = %name, "Refreshed ontology name");
        self.store.insert_resource(kind, id.clone(), name);

        if let Err(e) = self.refresh_versions(id).await {
            warn!(ontology_id = %id, error = %e, "Version refresh after name refresh failed");
        }
        Ok(())
    }

    /// Fetch and name every submission of `id`. Returns the batch size.
    async fn refresh_versions(&self, id: &OntologyId) -> TermBridgeResult<usize> {
        let records = self.catalog.list_versions(id).await?;
        if records.is_empty() {
            return Ok(0);
        }
        let resource = self.resource_name_for(id, &records);
        let named = name_version_batch(&resource, &records);
        self.store.insert_versions(&named);
        debug!(ontology_id = %id, versions = named.len(), "Refreshed version list");
        Ok(named.len())
    }

    async fn refresh_single_version(&self, version_id: &OntologyVersionId) -> TermBridgeResult<()> {
        let record = self.catalog.get_version(version_id).await?;
        let ontology_id = record.ontology_id();
        let resource = self.resource_name_for(&ontology_id, std::slice::from_ref(&record));

        let mut named = name_version(&resource, &record, false);
        if let Some(existing) = self.store.version_id(&named.version_name) {
            if existing != named.version_id {
                // Its declared version is already taken by a listed sibling.
                named = name_version(&resource, &record, true);
            }
        }
        debug!(%version_id, version_name = %named.version_name, "Named single submission");
        self.store.insert_versions(std::slice::from_ref(&named));
        Ok(())
    }

    /// The known resource name of `id`, or one derived from the newest
    /// record, which is then recorded.
    fn resource_name_for(&self, id: &OntologyId, records: &[OntologyRecord]) -> ResourceName {
        if let Some(name) = self.store.any_resource_name(id) {
            return name;
        }
        match records.iter().max_by_key(|r| r.version_id().numeric()) {
            Some(latest) => {
                let name = latest.resource_name();
                self.store
                    .insert_resource(latest.kind(), id.clone(), name.clone());
                name
            }
            None => ResourceName::new(id.as_str()),
        }
    }
}

#[async_trait]
impl<C: OntologyCatalog> Refresher for IdentityResolver<C> {
    async fn refresh(&self, strategy: &RefreshStrategy) -> TermBridgeResult<()> {
        match strategy {
            RefreshStrategy::SingleOntology(kind, id) => self.refresh_single_ontology(*kind, id).await,
            RefreshStrategy::VersionList(id) => self.refresh_versions(id).await.map(|_| ()),
            RefreshStrategy::SingleVersion(version_id) => {
                self.refresh_single_version(version_id).await
            }
            RefreshStrategy::StalenessRepair => self.repair_staleness().await.map(|_| ()),
        }
    }
}

impl<C> std::fmt::Debug for IdentityResolver<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityResolver")
            .field("stats", &self.store.stats())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use termbridge_core::ErrorKind;
    use termbridge_test_utils::fixtures::{icd10_batch, submission};
    use termbridge_test_utils::FakeCatalog;

    fn resolver(catalog: FakeCatalog) -> IdentityResolver<FakeCatalog> {
        IdentityResolver::new(catalog, Arc::new(IdentityStore::new()), IdentityConfig::default())
    }

    #[tokio::test]
    async fn test_code_system_name_miss_refreshes() {
        let catalog = FakeCatalog::new();
        catalog.add_latest(submission("1104", "44451", "ICD10", Some("3.2.1"), None));
        catalog.add_versions("1104", icd10_batch());
        let resolver = resolver(catalog);

        let name = resolver
            .resolve_code_system_name(&OntologyId::new("1104"))
            .await
            .expect("resolved");
        assert_eq!(name.as_str(), "ICD10");
        // The version list was refreshed alongside the name.
        assert!(resolver
            .store()
            .version_name(&OntologyVersionId::new("44450"))
            .is_some());
    }

    #[tokio::test]
    async fn test_value_set_kind_is_respected() {
        let catalog = FakeCatalog::new();
        let mut view = submission("2000", "50001", "VS1", Some("1"), None);
        view.is_view = true;
        catalog.add_latest(view);
        let resolver = resolver(catalog);

        let err = resolver
            .resolve_code_system_name(&OntologyId::new("2000"))
            .await
            .expect_err("a view is not a code system");
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let name = resolver
            .resolve_value_set_name(&OntologyId::new("2000"))
            .await
            .expect("value set");
        assert_eq!(name.as_str(), "VS1");
    }

    #[tokio::test]
    async fn test_resolve_ontology_id_is_cache_only() {
        let catalog = FakeCatalog::new();
        catalog.add_latest(submission("1104", "44451", "ICD10", None, None));
        let resolver = resolver(catalog);

        assert!(resolver
            .resolve_ontology_id(&ResourceName::new("ICD10"))
            .is_err());
        assert_eq!(resolver.catalog().calls(), 0);
    }

    #[tokio::test]
    async fn test_private_resource_propagates() {
        let catalog = FakeCatalog::new();
        catalog.mark_private("77");
        let resolver = resolver(catalog);

        let err = resolver
            .resolve_code_system_name(&OntologyId::new("77"))
            .await
            .expect_err("private");
        assert_eq!(err.kind(), ErrorKind::PrivateResource);
    }

    #[tokio::test]
    async fn test_composite_lookup_before_backfill_is_invariant_violation() {
        let resolver = resolver(FakeCatalog::new());
        let err = resolver
            .resolve_version_name_for_name_and_official_version_id(
                &ResourceName::new("ICD10"),
                "3.2.1",
            )
            .await
            .expect_err("no backfill yet");
        assert_eq!(err.kind(), ErrorKind::InvariantViolation);
    }

    #[tokio::test]
    async fn test_single_version_name_avoids_taken_name() {
        let catalog = FakeCatalog::new();
        catalog.add_versions(
            "1032",
            vec![submission("1032", "100", "GO", Some("1.2"), None)],
        );
        catalog.add_hidden_version(submission("1032", "105", "GO", Some("1.2"), None));
        let resolver = resolver(catalog);

        let listed = resolver
            .resolve_version_name(&OntologyId::new("1032"), &OntologyVersionId::new("100"))
            .await
            .expect("listed");
        let hidden = resolver
            .resolve_version_name(&OntologyId::new("1032"), &OntologyVersionId::new("105"))
            .await
            .expect("hidden");
        assert_eq!(listed.as_str(), "GO_1-2");
        assert_eq!(hidden.as_str(), "GO_105");
    }

    #[tokio::test]
    async fn test_warm_skips_failures() {
        let catalog = FakeCatalog::new();
        catalog.add_latest(submission("1104", "44451", "ICD10", Some("3.2.1"), None));
        catalog.add_versions("1104", icd10_batch());
        catalog.add_latest(submission("1105", "500", "BROKEN", None, None));
        catalog.fail_versions_with_transport("1105");
        let resolver = resolver(catalog);

        let summary = resolver.warm().await;
        assert_eq!(summary.resources, 2);
        assert_eq!(summary.versions, 2);
        assert_eq!(summary.failures, 1);
        assert!(resolver.store().has_backfilled());
    }
}
