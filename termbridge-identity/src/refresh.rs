//! Lookup with refresh-on-miss.

use async_trait::async_trait;
use termbridge_core::{OntologyId, OntologyVersionId, ResourceKind, TermBridgeError, TermBridgeResult};
use tracing::debug;

/// What to re-fetch from upstream after a lookup misses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStrategy {
    /// Fetch the latest submission of one ontology, then its version list.
    SingleOntology(ResourceKind, OntologyId),
    /// Fetch and rename every submission of one ontology.
    VersionList(OntologyId),
    /// Fetch one submission directly, for ids hidden from bulk listings.
    SingleVersion(OntologyVersionId),
    /// Re-read the latest listings and backfill submissions newer than the
    /// highest known version id.
    StalenessRepair,
}

/// Performs a [`RefreshStrategy`] against upstream and records the result.
#[async_trait]
pub trait Refresher: Send + Sync {
    async fn refresh(&self, strategy: &RefreshStrategy) -> TermBridgeResult<()>;
}

/// Look up a value, refreshing and retrying once per strategy on miss.
///
/// An upstream `NotFound` during a refresh counts as one more miss and
/// moves on to the next strategy. Any other refresh failure is returned.
/// When every strategy misses, `not_found()` supplies the error.
pub async fn resolve_with_refresh<T, L, R>(
    lookup: L,
    refresher: &R,
    strategies: &[RefreshStrategy],
    not_found: impl FnOnce() -> TermBridgeError,
) -> TermBridgeResult<T>
where
    L: Fn() -> Option<T>,
    R: Refresher + ?Sized,
{
    if let Some(value) = lookup() {
        return Ok(value);
    }

    for strategy in strategies {
        match refresher.refresh(strategy).await {
            Ok(()) => {}
            Err(e) if e.is_upstream_not_found() => {
                debug!(?strategy, error = %e, "Refresh found nothing upstream");
                continue;
            }
            Err(e) => return Err(e),
        }
        if let Some(value) = lookup() {
            return Ok(value);
        }
        debug!(?strategy, "Still missing after refresh");
    }

    Err(not_found())
}
