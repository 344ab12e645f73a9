//! Read-through response cache over both tiers.

use std::sync::Arc;

use termbridge_core::{redact_api_key, CacheConfig, TermBridgeResult, UpstreamError};
use tracing::debug;

use super::lmdb_backend::LmdbResponseStore;
use super::traits::{CacheStats, CacheTier, ResponseFetcher};
use super::volatile::VolatileResponseCache;

/// Statistics for both tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseCacheStats {
    pub persistent: CacheStats,
    pub volatile: CacheStats,
}

/// Two-tier cache of raw upstream response bodies keyed by full URL.
///
/// Concurrent misses on the same URL may both fetch; the later write wins.
pub struct ResponseCache {
    persistent: Arc<LmdbResponseStore>,
    volatile: VolatileResponseCache,
}

impl ResponseCache {
    pub fn new(persistent: Arc<LmdbResponseStore>, volatile: VolatileResponseCache) -> Self {
        Self {
            persistent,
            volatile,
        }
    }

    /// Open both tiers from configuration.
    pub fn open(config: &CacheConfig) -> TermBridgeResult<Self> {
        let persistent = LmdbResponseStore::open(&config.path, config.max_size_mb)?;
        let volatile = VolatileResponseCache::new(config.volatile_capacity)?;
        Ok(Self::new(Arc::new(persistent), volatile))
    }

    /// The persistent store, shared with the feed watermark.
    pub fn persistent(&self) -> &Arc<LmdbResponseStore> {
        &self.persistent
    }

    /// Return the cached body for `url`, fetching and storing it on a miss.
    ///
    /// An empty or absent upstream body is a transport failure and is never
    /// stored.
    pub async fn get_or_fetch<F>(
        &self,
        url: &str,
        tier: CacheTier,
        fetcher: &F,
    ) -> TermBridgeResult<String>
    where
        F: ResponseFetcher + ?Sized,
    {
        let cached = match tier {
            CacheTier::Persistent => self.persistent.get(url)?.map(|c| c.body),
            CacheTier::Volatile => self.volatile.get(url)?,
        };
        if let Some(body) = cached {
            debug!(url = %redact_api_key(url), ?tier, "Response cache hit");
            return Ok(body);
        }

        debug!(url = %redact_api_key(url), ?tier, "Response cache miss, fetching");
        let body = match fetcher.fetch(url).await? {
            Some(body) if !body.trim().is_empty() => body,
            _ => {
                return Err(UpstreamError::Transport {
                    url: redact_api_key(url),
                    reason: "empty response body".to_string(),
                }
                .into())
            }
        };

        match tier {
            CacheTier::Persistent => self.persistent.put(url, &body)?,
            CacheTier::Volatile => self.volatile.put(url, &body)?,
        }
        Ok(body)
    }

    /// Remove one persistent-tier entry and commit immediately.
    pub fn purge(&self, url: &str) -> TermBridgeResult<bool> {
        self.persistent.purge(url)
    }

    /// Drop the entry for `url` from one tier.
    pub fn discard(&self, url: &str, tier: CacheTier) -> TermBridgeResult<bool> {
        match tier {
            CacheTier::Persistent => self.persistent.purge(url),
            CacheTier::Volatile => self.volatile.remove(url),
        }
    }

    pub fn stats(&self) -> TermBridgeResult<ResponseCacheStats> {
        Ok(ResponseCacheStats {
            persistent: self.persistent.stats()?,
            volatile: self.volatile.stats()?,
        })
    }

    /// Flush the persistent tier to disk.
    pub fn flush(&self) -> TermBridgeResult<()> {
        self.persistent.flush()
    }
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("persistent", &self.persistent)
            .field("volatile", &self.volatile)
            .finish()
    }
}
