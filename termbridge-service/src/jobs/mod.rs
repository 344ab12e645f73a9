//! Background Jobs for the termbridge host
//!
//! - `feed_monitor`: polls the upstream change feed and invalidates cached
//!   listings
//!
//! # Usage
//!
//! Background jobs are spawned during startup:
//!
//! ```ignore
//! use termbridge_service::jobs::feed_monitor_task;
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(feed_monitor_task(Arc::new(monitor), config.feed.clone(), shutdown_rx));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod feed_monitor;

pub use feed_monitor::{
    feed_monitor_task, ChangeInvalidator, FeedMonitor, FeedMonitorMetrics, FeedMonitorSnapshot,
    TickOutcome,
};
