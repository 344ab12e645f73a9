//! TermBridge Upstream - Upstream Repository Client
//!
//! Everything that talks to the upstream ontology repository: URL
//! construction, the retrying HTTP client, the cached catalog client, and
//! the change feed source.

pub mod catalog;
pub mod feed;
pub mod http;
pub mod urls;

pub use catalog::{CatalogClient, OntologyCatalog};
pub use feed::{parse_feed, ChangeFeedSource, FeedEntry, HttpChangeFeed};
pub use http::UpstreamHttp;
pub use urls::UpstreamUrls;
