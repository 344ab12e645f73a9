//! Upstream URL construction.
//!
//! URLs double as response cache keys, so a given call must always produce
//! byte-identical URLs: path segments first, then call parameters in a fixed
//! order, then `apikey`.

use termbridge_core::{
    ConfigError, OntologyId, OntologyVersionId, ResourceKind, TermBridgeResult, UpstreamConfig,
};
use url::Url;

#[derive(Clone)]
pub struct UpstreamUrls {
    base: Url,
    api_key: String,
}

impl UpstreamUrls {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> TermBridgeResult<Self> {
        let base = Url::parse(base_url).map_err(|e| ConfigError::InvalidValue {
            field: "upstream.base_url".to_string(),
            value: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if base.cannot_be_a_base() {
            return Err(ConfigError::InvalidValue {
                field: "upstream.base_url".to_string(),
                value: base_url.to_string(),
                reason: "base_url cannot carry a path".to_string(),
            }
            .into());
        }
        Ok(Self {
            base,
            api_key: api_key.into(),
        })
    }

    pub fn from_config(config: &UpstreamConfig) -> TermBridgeResult<Self> {
        Self::new(&config.base_url, config.api_key.clone())
    }

    fn build(&self, segments: &[&str], params: &[(&str, &str)]) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        {
            let mut query = url.query_pairs_mut();
            for (key, value) in params {
                query.append_pair(key, value);
            }
            query.append_pair("apikey", &self.api_key);
        }
        url.into()
    }

    /// Latest submission of every ontology (code systems) or view (value sets).
    pub fn list_latest(&self, kind: ResourceKind) -> String {
        match kind {
            ResourceKind::CodeSystem => self.build(&["ontologies"], &[]),
            ResourceKind::ValueSet => self.build(&["views"], &[]),
        }
    }

    /// Latest submission of one ontology, by its "virtual" id.
    pub fn get_latest(&self, id: &OntologyId) -> String {
        self.build(&["virtual", "ontology", id.as_str()], &[])
    }

    pub fn list_versions(&self, id: &OntologyId) -> String {
        self.build(&["ontologies", "versions", id.as_str()], &[])
    }

    pub fn get_version(&self, version_id: &OntologyVersionId) -> String {
        self.build(&["ontologies", version_id.as_str()], &[])
    }

    pub fn list_entities(&self, version_id: &OntologyVersionId, page_size: u32, page: u32) -> String {
        self.build(
            &["concepts", version_id.as_str(), "all"],
            &[
                ("pagesize", &page_size.to_string()),
                ("pagenum", &page.to_string()),
            ],
        )
    }

    pub fn search_entities(&self, query: &str, ontology_ids: &[OntologyId]) -> String {
        let ids = ontology_ids
            .iter()
            .map(OntologyId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let mut params = vec![("query", query)];
        if !ids.is_empty() {
            params.push(("ontologyids", ids.as_str()));
        }
        self.build(&["search", ""], &params)
    }

    /// Persistent-tier keys to purge when ontology `id` changes upstream.
    pub fn invalidation_urls(&self, id: &OntologyId) -> Vec<String> {
        vec![
            self.list_latest(ResourceKind::CodeSystem),
            self.list_latest(ResourceKind::ValueSet),
            self.get_latest(id),
            self.list_versions(id),
        ]
    }
}

impl std::fmt::Debug for UpstreamUrls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpstreamUrls")
            .field("base", &self.base.as_str())
            .field("api_key", &"[REDACTED]")
            .finish()
    }
}
