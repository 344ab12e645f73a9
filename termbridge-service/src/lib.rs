//! TermBridge Service - Host Process
//!
//! Wires the response cache, upstream client and identity resolver
//! together, and runs the background change feed monitor.

pub mod config;
pub mod error;
pub mod jobs;
pub mod state;
pub mod telemetry;

pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use jobs::{feed_monitor_task, ChangeInvalidator, FeedMonitor, FeedMonitorMetrics, TickOutcome};
pub use state::{AppState, ServiceResolver};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
