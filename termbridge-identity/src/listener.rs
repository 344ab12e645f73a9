//! Consumer side of the change channel.
//!
//! The feed monitor publishes one [`ChangeBatch`] per advancing tick; this
//! listener refreshes the resolver for each batch, one batch at a time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use termbridge_core::OntologyId;
use termbridge_upstream::OntologyCatalog;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use crate::resolver::IdentityResolver;

/// Ontologies reported as changed by one feed tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeBatch {
    pub ontology_ids: Vec<OntologyId>,
    /// Watermark the monitor advanced to with this batch.
    pub watermark: DateTime<Utc>,
}

/// Refresh the resolver for every received batch until the channel closes
/// or shutdown is signalled.
pub async fn run_change_listener<C>(
    resolver: Arc<IdentityResolver<C>>,
    mut changes: mpsc::Receiver<ChangeBatch>,
    mut shutdown: watch::Receiver<bool>,
) where
    C: OntologyCatalog,
{
    info!("Change listener started");

    loop {
        tokio::select! {
            batch = changes.recv() => {
                let Some(batch) = batch else {
                    debug!("Change channel closed");
                    break;
                };
                let refreshed = resolver.refresh_changed(&batch.ontology_ids).await;
                info!(
                    changed = batch.ontology_ids.len(),
                    refreshed,
                    watermark = %batch.watermark,
                    "Applied change batch"
                );
            }
            result = shutdown.changed() => {
                if result.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("Change listener stopped");
}
