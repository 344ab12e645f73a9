//! Bounded in-memory response tier.

use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use termbridge_core::{ConfigError, StorageError, TermBridgeResult};

use super::traits::CacheStats;

struct VolatileInner {
    entries: LruCache<String, String>,
    stats: CacheStats,
}

/// Fixed-capacity LRU of URL -> response body.
///
/// Entries live until evicted by capacity or process exit.
pub struct VolatileResponseCache {
    inner: Mutex<VolatileInner>,
    capacity: NonZeroUsize,
}

impl VolatileResponseCache {
    pub fn new(capacity: usize) -> TermBridgeResult<Self> {
        let capacity = NonZeroUsize::new(capacity).ok_or_else(|| ConfigError::InvalidValue {
            field: "cache.volatile_capacity".to_string(),
            value: capacity.to_string(),
            reason: "must be positive".to_string(),
        })?;
        Ok(Self {
            inner: Mutex::new(VolatileInner {
                entries: LruCache::new(capacity),
                stats: CacheStats::default(),
            }),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity.get()
    }

    pub fn get(&self, url: &str) -> TermBridgeResult<Option<String>> {
        let mut inner = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        let found = inner.entries.get(url).cloned();
        if found.is_some() {
            inner.stats.hits += 1;
        } else {
            inner.stats.misses += 1;
        }
        Ok(found)
    }

    pub fn put(&self, url: &str, body: &str) -> TermBridgeResult<()> {
        let mut inner = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        if let Some((displaced, _)) = inner.entries.push(url.to_string(), body.to_string()) {
            if displaced != url {
                inner.stats.evictions += 1;
            }
        }
        Ok(())
    }

    pub fn remove(&self, url: &str) -> TermBridgeResult<bool> {
        let mut inner = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        let removed = inner.entries.pop(url).is_some();
        if removed {
            inner.stats.purges += 1;
        }
        Ok(removed)
    }

    pub fn stats(&self) -> TermBridgeResult<CacheStats> {
        let inner = self.inner.lock().map_err(|_| StorageError::LockPoisoned)?;
        let mut stats = inner.stats.clone();
        stats.entry_count = inner.entries.len() as u64;
        Ok(stats)
    }
}

impl std::fmt::Debug for VolatileResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VolatileResponseCache")
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}
