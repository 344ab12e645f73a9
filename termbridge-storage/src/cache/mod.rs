//! Two-tier response cache.
//!
//! - Persistent tier: LMDB, keyed by full upstream URL, entries live until
//!   purged. Used for catalog listings and detail calls whose freshness is
//!   managed by the change feed.
//! - Volatile tier: bounded LRU for high-cardinality calls.
//!
//! Both tiers are reached through [`ResponseCache::get_or_fetch`], which
//! calls a [`ResponseFetcher`] on miss.

pub mod lmdb_backend;
pub mod read_through;
pub mod traits;
pub mod volatile;
pub mod watermark;

pub use lmdb_backend::{CachedResponse, LmdbResponseStore};
pub use read_through::{ResponseCache, ResponseCacheStats};
pub use traits::{CacheStats, CacheTier, ResponseFetcher};
pub use volatile::VolatileResponseCache;
pub use watermark::{InMemoryWatermarkStore, Watermark, WatermarkStore};
