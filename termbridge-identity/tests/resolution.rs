//! Resolution scenarios across the resolver, the catalog client and the
//! response cache.

use std::sync::Arc;

use serde_json::json;
use termbridge_core::{
    ErrorKind, IdentityConfig, OntologyId, OntologyVersionId, ResourceName, VersionName,
};
use termbridge_identity::{IdentityResolver, IdentityStore};
use termbridge_storage::{LmdbResponseStore, ResponseCache, VolatileResponseCache};
use termbridge_test_utils::assertions::{assert_error_kind, assert_not_found};
use termbridge_test_utils::fixtures::{foo_batch, icd10_batch, submission, temp_cache_dir};
use termbridge_test_utils::{CountingFetcher, FakeCatalog};
use termbridge_upstream::{CatalogClient, UpstreamUrls};

fn resolver_over(catalog: FakeCatalog) -> IdentityResolver<FakeCatalog> {
    IdentityResolver::new(catalog, Arc::new(IdentityStore::new()), IdentityConfig::default())
}

fn icd10_catalog() -> FakeCatalog {
    let catalog = FakeCatalog::new();
    catalog.add_latest(submission("1104", "44451", "ICD10", Some("3.2.1"), None));
    catalog.add_versions("1104", icd10_batch());
    catalog
}

#[tokio::test]
async fn icd10_duplicate_versions_are_named_by_id() {
    let resolver = resolver_over(icd10_catalog());
    let id = OntologyId::new("1104");

    let first = resolver
        .resolve_version_name(&id, &OntologyVersionId::new("44450"))
        .await
        .unwrap();
    let second = resolver
        .resolve_version_name(&id, &OntologyVersionId::new("44451"))
        .await
        .unwrap();

    assert_eq!(first.as_str(), "ICD10_44450");
    assert_eq!(second.as_str(), "ICD10_44451");
    assert_eq!(
        resolver.store().official_version(&first).as_deref(),
        Some("3.2.1")
    );
}

#[tokio::test]
async fn foo_unknown_version_is_named_after_resource() {
    let catalog = FakeCatalog::new();
    catalog.add_latest(foo_batch().remove(0));
    catalog.add_versions("2001", foo_batch());
    let resolver = resolver_over(catalog);

    let name = resolver
        .resolve_version_name(&OntologyId::new("2001"), &OntologyVersionId::new("60001"))
        .await
        .unwrap();
    assert_eq!(name.as_str(), "FOO");

    let back = resolver.resolve_ontology_version_id(&name).await.unwrap();
    assert_eq!(back, OntologyVersionId::new("60001"));
}

#[tokio::test]
async fn resource_name_round_trips() {
    let resolver = resolver_over(icd10_catalog());
    let id = OntologyId::new("1104");

    let name = resolver.resolve_code_system_name(&id).await.unwrap();
    assert_eq!(resolver.resolve_ontology_id(&name).unwrap(), id);
}

#[tokio::test]
async fn hidden_submission_round_trips_through_single_version_fallback() {
    let catalog = FakeCatalog::new();
    catalog.add_versions(
        "1032",
        vec![
            submission("1032", "100", "GO", Some("1.2"), Some("OBO")),
            submission("1032", "101", "GO", Some("1.3"), Some("OBO")),
        ],
    );
    catalog.add_hidden_version(submission("1032", "99", "GO", Some("1.1"), Some("OBO")));
    let resolver = resolver_over(catalog);

    let version_id = OntologyVersionId::new("99");
    let name = resolver
        .resolve_version_name(&OntologyId::new("1032"), &version_id)
        .await
        .unwrap();
    assert_eq!(name.as_str(), "GO_1-1_OBO");
    assert_eq!(
        resolver.resolve_ontology_version_id(&name).await.unwrap(),
        version_id
    );
}

#[tokio::test]
async fn unknown_version_is_terminal_not_found() {
    let resolver = resolver_over(icd10_catalog());

    let result = resolver
        .resolve_version_name(&OntologyId::new("1104"), &OntologyVersionId::new("1"))
        .await;
    assert_not_found(&result);
}

#[tokio::test]
async fn staleness_repair_names_new_submissions() {
    let resolver = resolver_over(icd10_catalog());
    let warmed = resolver.warm().await;
    assert_eq!(warmed.versions, 2);

    // A new ICD10 submission lands upstream after warming.
    let catalog = resolver.catalog();
    catalog.add_latest(submission("1104", "44460", "ICD10", Some("4.0"), None));
    let mut batch = icd10_batch();
    batch.push(submission("1104", "44460", "ICD10", Some("4.0"), None));
    catalog.add_versions("1104", batch);

    let name = VersionName::parse("ICD10_44460").unwrap();
    let id = resolver.resolve_ontology_version_id(&name).await.unwrap();
    assert_eq!(id, OntologyVersionId::new("44460"));

    // Earlier names are unchanged by the repair.
    assert_eq!(
        resolver
            .store()
            .version_id(&VersionName::parse("ICD10_44450").unwrap()),
        Some(OntologyVersionId::new("44450"))
    );
}

#[tokio::test]
async fn staleness_repair_summary_counts_discoveries() {
    let resolver = resolver_over(icd10_catalog());
    resolver.warm().await;

    let catalog = resolver.catalog();
    catalog.add_latest(submission("1200", "50000", "NEW", Some("1"), None));
    catalog.add_versions(
        "1200",
        vec![submission("1200", "50000", "NEW", Some("1"), None)],
    );

    let summary = resolver.repair_staleness().await.unwrap();
    assert_eq!(summary.floor, Some(44451));
    assert_eq!(summary.discovered, 1);
    assert_eq!(summary.backfilled, 1);
    assert_eq!(
        resolver
            .resolve_ontology_id(&ResourceName::new("NEW"))
            .unwrap(),
        OntologyId::new("1200")
    );
}

#[tokio::test]
async fn composite_lookup_by_disambiguator_and_after_repair() {
    let catalog = FakeCatalog::new();
    catalog.add_latest(submission("1032", "101", "GO", Some("1.3"), None));
    catalog.add_versions(
        "1032",
        vec![
            submission("1032", "100", "GO", Some("1.2"), None),
            submission("1032", "101", "GO", Some("1.3"), None),
        ],
    );
    let resolver = resolver_over(catalog);
    resolver.warm().await;
    let go = ResourceName::new("GO");

    let found = resolver
        .resolve_version_name_for_name_and_official_version_id(&go, "1.2")
        .await
        .unwrap();
    assert_eq!(found.as_str(), "GO_1-2");

    // 1.4 only exists upstream; the miss triggers a repair pass.
    let catalog = resolver.catalog();
    catalog.add_latest(submission("1032", "102", "GO", Some("1.4"), None));
    catalog.add_versions(
        "1032",
        vec![
            submission("1032", "100", "GO", Some("1.2"), None),
            submission("1032", "101", "GO", Some("1.3"), None),
            submission("1032", "102", "GO", Some("1.4"), None),
        ],
    );
    let repaired = resolver
        .resolve_version_name_for_name_and_official_version_id(&go, "1.4")
        .await
        .unwrap();
    assert_eq!(repaired.as_str(), "GO_1-4");

    let missing = resolver
        .resolve_version_name_for_name_and_official_version_id(&go, "9.9")
        .await;
    assert_not_found(&missing);
}

#[tokio::test]
async fn composite_lookup_refuses_shared_official_version() {
    let resolver = resolver_over(icd10_catalog());
    resolver.warm().await;
    let icd10 = ResourceName::new("ICD10");

    // 44450 and 44451 both declare 3.2.1; neither is the answer.
    let shared = resolver
        .resolve_version_name_for_name_and_official_version_id(&icd10, "3.2.1")
        .await;
    assert_not_found(&shared);

    let by_id = resolver
        .resolve_version_name_for_name_and_official_version_id(&icd10, "44450")
        .await
        .unwrap();
    assert_eq!(by_id.as_str(), "ICD10_44450");
}

#[tokio::test]
async fn private_ontology_is_forbidden_not_missing() {
    let catalog = icd10_catalog();
    catalog.mark_private("1104");
    let resolver = resolver_over(catalog);

    let result = resolver
        .resolve_code_system_name(&OntologyId::new("1104"))
        .await;
    assert_error_kind(&result, ErrorKind::PrivateResource);
}

#[tokio::test]
async fn catalog_client_serves_repeat_resolution_from_cache() {
    let dir = temp_cache_dir();
    let store = Arc::new(LmdbResponseStore::open(dir.path(), 16).unwrap());
    let cache = Arc::new(ResponseCache::new(
        store,
        VolatileResponseCache::new(25).unwrap(),
    ));
    let urls = UpstreamUrls::new("http://data.example.org/", "secret").unwrap();
    let id = OntologyId::new("1104");

    let latest = json!({
        "ontologyId": 1104, "id": 44451, "abbreviation": "ICD10", "versionNumber": "3.2.1"
    });
    let versions = json!([
        { "ontologyId": 1104, "id": 44450, "abbreviation": "ICD10", "versionNumber": "3.2.1" },
        { "ontologyId": 1104, "id": 44451, "abbreviation": "ICD10", "versionNumber": "3.2.1" }
    ]);
    let fetcher = Arc::new(
        CountingFetcher::new()
            .with_body(urls.get_latest(&id), latest.to_string())
            .with_body(urls.list_versions(&id), versions.to_string()),
    );

    let client = CatalogClient::new(cache.clone(), fetcher.clone(), urls.clone());
    let resolver = IdentityResolver::new(
        client,
        Arc::new(IdentityStore::new()),
        IdentityConfig::default(),
    );
    let name = resolver.resolve_code_system_name(&id).await.unwrap();
    assert_eq!(name.as_str(), "ICD10");
    assert_eq!(fetcher.total_calls(), 2);

    // A cold identity store over the same cache does not go upstream again.
    let client = CatalogClient::new(cache, fetcher.clone(), urls);
    let cold = IdentityResolver::new(
        client,
        Arc::new(IdentityStore::new()),
        IdentityConfig::default(),
    );
    let version = cold
        .resolve_version_name(&id, &OntologyVersionId::new("44450"))
        .await
        .unwrap();
    assert_eq!(version.as_str(), "ICD10_44450");
    assert_eq!(fetcher.total_calls(), 2);
}
