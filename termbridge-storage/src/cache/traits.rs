//! Cache tier selection, the fetch seam, and statistics.

use async_trait::async_trait;
use termbridge_core::TermBridgeResult;

/// Which tier of the response cache a call is routed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTier {
    /// Disk-backed, survives restarts, purged explicitly.
    /// Used for catalog listings and detail calls.
    Persistent,
    /// Bounded in-memory LRU. Used for high-cardinality calls such as
    /// entity listings and search.
    Volatile,
}

/// Fetches a response body from the upstream on cache miss.
///
/// `Ok(None)` means the upstream answered without a body. The cache treats
/// that as a failure and never stores it.
#[async_trait]
pub trait ResponseFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> TermBridgeResult<Option<String>>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Number of evictions due to capacity.
    pub evictions: u64,
    /// Number of explicit purges that removed an entry.
    pub purges: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
