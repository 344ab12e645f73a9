//! Shared process state: every long-lived component, wired once at startup.

use std::sync::Arc;
use std::time::Instant;

use termbridge_core::TermBridgeConfig;
use termbridge_identity::{ChangeBatch, IdentityResolver, IdentityStore};
use termbridge_storage::{ResponseCache, ResponseFetcher, WatermarkStore};
use termbridge_upstream::{CatalogClient, ChangeFeedSource, HttpChangeFeed, UpstreamHttp, UpstreamUrls};
use tokio::sync::mpsc;

use crate::error::ServiceResult;
use crate::jobs::FeedMonitor;

/// The resolver the host serves, reading the catalog through the cache.
pub type ServiceResolver = IdentityResolver<Arc<CatalogClient>>;

/// Application-wide state.
#[derive(Clone)]
pub struct AppState {
    pub config: TermBridgeConfig,
    /// Both response tiers. The persistent tier also holds the feed watermark.
    pub cache: Arc<ResponseCache>,
    pub catalog: Arc<CatalogClient>,
    pub resolver: Arc<ServiceResolver>,
    /// `None` when no feed URL is configured.
    pub feed: Option<Arc<dyn ChangeFeedSource>>,
    pub start_time: Instant,
}

impl AppState {
    /// Open the response cache and build the HTTP-backed components.
    pub fn open(config: TermBridgeConfig) -> ServiceResult<Self> {
        let cache = Arc::new(ResponseCache::open(&config.cache)?);
        let http = Arc::new(UpstreamHttp::new(&config.upstream)?);
        let feed = config
            .feed
            .feed_url
            .clone()
            .map(|url| Arc::new(HttpChangeFeed::new(http.clone(), url)) as Arc<dyn ChangeFeedSource>);
        Self::with_parts(config, cache, http, feed)
    }

    /// Wire the components around an already open cache and an arbitrary
    /// fetcher and feed.
    pub fn with_parts(
        config: TermBridgeConfig,
        cache: Arc<ResponseCache>,
        fetcher: Arc<dyn ResponseFetcher>,
        feed: Option<Arc<dyn ChangeFeedSource>>,
    ) -> ServiceResult<Self> {
        let urls = UpstreamUrls::from_config(&config.upstream)?;
        let catalog = Arc::new(CatalogClient::new(cache.clone(), fetcher, urls));
        let resolver = Arc::new(IdentityResolver::new(
            catalog.clone(),
            Arc::new(IdentityStore::new()),
            config.identity.clone(),
        ));

        tracing::info!(
            cache_path = %config.cache.path.display(),
            volatile_capacity = config.cache.volatile_capacity,
            feed_enabled = feed.is_some(),
            "Application state wired"
        );

        Ok(Self {
            config,
            cache,
            catalog,
            resolver,
            feed,
            start_time: Instant::now(),
        })
    }

    /// Build the feed monitor publishing to `changes`, if a feed is
    /// configured. The watermark lives in the persistent cache tier.
    pub fn feed_monitor(&self, changes: mpsc::Sender<ChangeBatch>) -> Option<FeedMonitor> {
        let source = self.feed.clone()?;
        let watermarks: Arc<dyn WatermarkStore> = self.cache.persistent().clone();
        Some(FeedMonitor::new(
            source,
            self.catalog.clone(),
            watermarks,
            changes,
        ))
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("resolver", &self.resolver)
            .field("feed_enabled", &self.feed.is_some())
            .finish_non_exhaustive()
    }
}
