//! Change Feed Monitor Background Task
//!
//! Polls the upstream change feed on a fixed period. Each tick:
//!
//! 1. Fetches the feed and takes the newest publish timestamp
//! 2. Stops if that is not newer than the persisted watermark
//! 3. Collects the ids of resources published after the previous watermark
//! 4. Purges the persistent-tier listings describing each of them
//! 5. Persists the new watermark
//! 6. Sends the changed ids to the identity change listener
//!
//! A failed feed fetch skips the tick without advancing the watermark. No
//! failure here is fatal to request serving.
//!
//! # Configuration
//!
//! The task is configured via `FeedMonitorConfig`:
//!
//! ```rust
//! use termbridge_core::FeedMonitorConfig;
//! use std::time::Duration;
//!
//! let config = FeedMonitorConfig {
//!     feed_url: Some("http://bioportal.example.org/feed.json".to_string()),
//!     check_interval: Duration::from_secs(3600), // hourly
//!     channel_capacity: 16,
//! };
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use termbridge_core::{FeedMonitorConfig, OntologyId, TermBridgeResult};
use termbridge_identity::ChangeBatch;
use termbridge_storage::{Watermark, WatermarkStore};
use termbridge_upstream::{CatalogClient, ChangeFeedSource};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// INVALIDATION
// ============================================================================

/// Purges cached upstream responses describing one ontology.
pub trait ChangeInvalidator: Send + Sync {
    /// Returns how many cached entries were removed.
    fn invalidate(&self, id: &OntologyId) -> TermBridgeResult<usize>;
}

impl ChangeInvalidator for CatalogClient {
    fn invalidate(&self, id: &OntologyId) -> TermBridgeResult<usize> {
        CatalogClient::invalidate(self, id)
    }
}

impl<T: ChangeInvalidator + ?Sized> ChangeInvalidator for Arc<T> {
    fn invalidate(&self, id: &OntologyId) -> TermBridgeResult<usize> {
        (**self).invalidate(id)
    }
}

// ============================================================================
// MONITOR
// ============================================================================

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// The feed or the watermark store failed; nothing changed.
    Skipped,
    /// Nothing newer than the watermark.
    UpToDate,
    /// The watermark moved forward.
    Advanced {
        changed: Vec<OntologyId>,
        purged: usize,
        watermark: DateTime<Utc>,
    },
}

/// One change feed, one cache, one watermark, one listener.
pub struct FeedMonitor {
    source: Arc<dyn ChangeFeedSource>,
    invalidator: Arc<dyn ChangeInvalidator>,
    watermarks: Arc<dyn WatermarkStore>,
    changes: mpsc::Sender<ChangeBatch>,
}

impl FeedMonitor {
    pub fn new(
        source: Arc<dyn ChangeFeedSource>,
        invalidator: Arc<dyn ChangeInvalidator>,
        watermarks: Arc<dyn WatermarkStore>,
        changes: mpsc::Sender<ChangeBatch>,
    ) -> Self {
        Self {
            source,
            invalidator,
            watermarks,
            changes,
        }
    }

    /// Run one poll of the feed.
    pub async fn tick(&self) -> TickOutcome {
        let entries = match self.source.fetch_entries().await {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(error = %e, "Change feed fetch failed, skipping tick");
                return TickOutcome::Skipped;
            }
        };

        let Some(newest) = entries.iter().map(|entry| entry.published).max() else {
            tracing::trace!("Change feed is empty");
            return TickOutcome::UpToDate;
        };

        let previous = match self.watermarks.load().await {
            Ok(previous) => previous,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load feed watermark, skipping tick");
                return TickOutcome::Skipped;
            }
        };
        let watermark = Watermark::new(newest);
        if let Some(previous) = previous {
            if !watermark.is_newer_than(&previous) {
                tracing::trace!(watermark = %previous.published_at, "Change feed up to date");
                return TickOutcome::UpToDate;
            }
        }

        let mut seen = HashSet::new();
        let mut changed = Vec::new();
        for entry in &entries {
            if previous.is_some_and(|p| !p.precedes(entry.published)) {
                continue;
            }
            match entry.resource_id() {
                Some(id) => {
                    if seen.insert(id.clone()) {
                        changed.push(id);
                    }
                }
                None => tracing::debug!(link = %entry.link, "Feed entry without resource id"),
            }
        }

        let mut purged = 0;
        for id in &changed {
            match self.invalidator.invalidate(id) {
                Ok(count) => purged += count,
                Err(e) => {
                    tracing::warn!(ontology_id = %id, error = %e, "Failed to purge cached listings")
                }
            }
        }

        if let Err(e) = self.watermarks.store(watermark).await {
            tracing::error!(error = %e, "Failed to persist feed watermark, skipping tick");
            return TickOutcome::Skipped;
        }

        if !changed.is_empty() {
            let batch = ChangeBatch {
                ontology_ids: changed.clone(),
                watermark: newest,
            };
            if self.changes.send(batch).await.is_err() {
                tracing::warn!("Change listener is gone, batch dropped");
            }
        }

        tracing::info!(
            changed = changed.len(),
            purged,
            watermark = %newest,
            "Change feed watermark advanced"
        );
        TickOutcome::Advanced {
            changed,
            purged,
            watermark: newest,
        }
    }
}

impl std::fmt::Debug for FeedMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedMonitor").finish_non_exhaustive()
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters for feed monitor activity since startup.
#[derive(Debug, Default)]
pub struct FeedMonitorMetrics {
    /// Ticks run.
    pub ticks: AtomicU64,
    /// Ticks that advanced the watermark.
    pub advances: AtomicU64,
    /// Ticks skipped on failure.
    pub skipped: AtomicU64,
    /// Ontologies reported as changed.
    pub ontologies_changed: AtomicU64,
    /// Cached responses purged.
    pub entries_purged: AtomicU64,
}

impl FeedMonitorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&self, outcome: &TickOutcome) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        match outcome {
            TickOutcome::Skipped => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
            }
            TickOutcome::UpToDate => {}
            TickOutcome::Advanced {
                changed, purged, ..
            } => {
                self.advances.fetch_add(1, Ordering::Relaxed);
                self.ontologies_changed
                    .fetch_add(changed.len() as u64, Ordering::Relaxed);
                self.entries_purged
                    .fetch_add(*purged as u64, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> FeedMonitorSnapshot {
        FeedMonitorSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            advances: self.advances.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            ontologies_changed: self.ontologies_changed.load(Ordering::Relaxed),
            entries_purged: self.entries_purged.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of feed monitor metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeedMonitorSnapshot {
    pub ticks: u64,
    pub advances: u64,
    pub skipped: u64,
    pub ontologies_changed: u64,
    pub entries_purged: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that ticks `monitor` every `config.check_interval`
/// until the shutdown signal is received.
///
/// The first tick runs immediately. Ticks never overlap; a tick that
/// overruns the period delays the next one instead of bunching them.
///
/// # Example
///
/// ```ignore
/// let (shutdown_tx, shutdown_rx) = watch::channel(false);
/// let handle = tokio::spawn(feed_monitor_task(monitor, config.feed.clone(), shutdown_rx));
///
/// // Later, trigger shutdown
/// let _ = shutdown_tx.send(true);
/// let metrics = handle.await?;
/// ```
pub async fn feed_monitor_task(
    monitor: Arc<FeedMonitor>,
    config: FeedMonitorConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<FeedMonitorMetrics> {
    let metrics = Arc::new(FeedMonitorMetrics::new());

    let mut ticker = interval(config.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_secs = config.check_interval.as_secs(),
        "Feed monitor task started"
    );

    loop {
        tokio::select! {
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    tracing::info!("Feed monitor task shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                let outcome = monitor.tick().await;
                metrics.record(&outcome);
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        ticks = snapshot.ticks,
        advances = snapshot.advances,
        skipped = snapshot.skipped,
        ontologies_changed = snapshot.ontologies_changed,
        entries_purged = snapshot.entries_purged,
        "Feed monitor task completed"
    );

    metrics
}

// ============================================================================
// TESTS
// ============================================================================
