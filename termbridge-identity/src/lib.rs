//! TermBridge Identity - Name/Id Resolution
//!
//! Maps upstream ontology and submission ids to the human-legible names the
//! terminology API exposes, and back:
//!
//! - [`IdentityStore`]: the shared in-memory indexes
//! - [`naming`]: version-name derivation with batch-wide disambiguation
//! - [`IdentityResolver`]: lookups with refresh-on-miss against the catalog
//! - [`run_change_listener`]: applies change batches from the feed monitor

pub mod listener;
pub mod naming;
pub mod refresh;
pub mod resolver;
pub mod store;

pub use listener::{run_change_listener, ChangeBatch};
pub use naming::{declared_versions_unique, name_version, name_version_batch, NamedVersion};
pub use refresh::{resolve_with_refresh, RefreshStrategy, Refresher};
pub use resolver::{IdentityResolver, RepairSummary, WarmSummary};
pub use store::{IdentityStore, IdentityStoreStats};
