//! TermBridge Storage - Response Cache and Watermark Store
//!
//! Local state that survives between upstream calls: raw response bodies
//! (persistent and volatile tiers) and the change feed watermark.

pub mod cache;

pub use cache::{
    CacheStats, CacheTier, CachedResponse, InMemoryWatermarkStore, LmdbResponseStore,
    ResponseCache, ResponseCacheStats, ResponseFetcher, VolatileResponseCache, Watermark,
    WatermarkStore,
};
