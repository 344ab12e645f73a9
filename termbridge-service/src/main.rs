//! termbridge host entry point
//!
//! Loads configuration, warms the identity resolver and runs the change
//! feed monitor until ctrl-c.

use std::sync::Arc;

use termbridge_identity::run_change_listener;
use termbridge_service::{
    feed_monitor_task, init_tracing, AppState, ServiceConfig, ServiceResult,
};
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() -> ServiceResult<()> {
    let config = ServiceConfig::from_env()?;
    init_tracing(&config.telemetry)?;

    let state = AppState::open(config.termbridge.clone())?;

    if config.termbridge.identity.warm_on_startup {
        state.resolver.warm().await;
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (changes_tx, changes_rx) = mpsc::channel(config.termbridge.feed.channel_capacity);

    let listener = tokio::spawn(run_change_listener(
        state.resolver.clone(),
        changes_rx,
        shutdown_rx.clone(),
    ));

    let monitor = match state.feed_monitor(changes_tx) {
        Some(monitor) => Some(tokio::spawn(feed_monitor_task(
            Arc::new(monitor),
            config.termbridge.feed.clone(),
            shutdown_rx,
        ))),
        None => {
            tracing::info!("No change feed configured, feed monitor disabled");
            None
        }
    };

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);

    if let Some(monitor) = monitor {
        monitor.await?;
    }
    listener.await?;

    state.cache.flush()?;
    tracing::info!(uptime_secs = state.start_time.elapsed().as_secs(), "termbridge stopped");
    Ok(())
}
