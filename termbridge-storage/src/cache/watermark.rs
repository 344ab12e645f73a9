//! Change feed watermark.
//!
//! The watermark is the publish timestamp of the newest feed entry that has
//! already been processed. Entries at or before it are never processed again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use termbridge_core::{StorageError, TermBridgeResult};
use tokio::sync::RwLock;

/// A point in the change feed's publish timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark {
    pub published_at: DateTime<Utc>,
}

impl Watermark {
    pub fn new(published_at: DateTime<Utc>) -> Self {
        Self { published_at }
    }

    /// Check if this watermark is strictly newer than another.
    pub fn is_newer_than(&self, other: &Watermark) -> bool {
        self.published_at > other.published_at
    }

    /// True when a feed entry published at `at` has not been processed yet.
    pub fn precedes(&self, at: DateTime<Utc>) -> bool {
        at > self.published_at
    }

    pub fn to_rfc3339(&self) -> String {
        self.published_at.to_rfc3339()
    }

    pub fn parse_rfc3339(raw: &str) -> TermBridgeResult<Self> {
        DateTime::parse_from_rfc3339(raw.trim())
            .map(|dt| Self::new(dt.with_timezone(&Utc)))
            .map_err(|e| {
                StorageError::Serialization {
                    reason: format!("invalid watermark '{raw}': {e}"),
                }
                .into()
            })
    }
}

/// Persistence for the feed watermark.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// The persisted watermark, or `None` before the first successful tick.
    async fn load(&self) -> TermBridgeResult<Option<Watermark>>;

    /// Persist a new watermark, durably.
    async fn store(&self, watermark: Watermark) -> TermBridgeResult<()>;
}

/// In-memory watermark store for testing.
#[derive(Debug, Default)]
pub struct InMemoryWatermarkStore {
    current: RwLock<Option<Watermark>>,
}

impl InMemoryWatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an already-persisted watermark.
    pub fn with_watermark(watermark: Watermark) -> Self {
        Self {
            current: RwLock::new(Some(watermark)),
        }
    }
}

#[async_trait]
impl WatermarkStore for InMemoryWatermarkStore {
    async fn load(&self) -> TermBridgeResult<Option<Watermark>> {
        Ok(*self.current.read().await)
    }

    async fn store(&self, watermark: Watermark) -> TermBridgeResult<()> {
        *self.current.write().await = Some(watermark);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2011, 3, 1, hour, 0, 0)
            .single()
            .expect("valid timestamp")
    }

    #[test]
    fn test_watermark_ordering() {
        let older = Watermark::new(at(1));
        let newer = Watermark::new(at(2));
        assert!(newer.is_newer_than(&older));
        assert!(!older.is_newer_than(&newer));
        assert!(!older.is_newer_than(&older));
    }

    #[test]
    fn test_precedes_is_strict() {
        let wm = Watermark::new(at(5));
        assert!(wm.precedes(at(6)));
        assert!(!wm.precedes(at(5)));
        assert!(!wm.precedes(at(4)));
    }

    #[test]
    fn test_rfc3339_round_trip() {
        let wm = Watermark::new(at(7));
        let parsed = Watermark::parse_rfc3339(&wm.to_rfc3339()).expect("parse");
        assert_eq!(parsed, wm);
        assert!(Watermark::parse_rfc3339("yesterday").is_err());
    }

    #[tokio::test]
    async fn test_in_memory_store() {
        let store = InMemoryWatermarkStore::new();
        assert_eq!(store.load().await.expect("load"), None);

        store.store(Watermark::new(at(3))).await.expect("store");
        assert_eq!(
            store.load().await.expect("load"),
            Some(Watermark::new(at(3)))
        );
    }
}
