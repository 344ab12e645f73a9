//! Change feed source.
//!
//! The upstream publishes a syndication feed (RSS or Atom; JSON Feed is
//! accepted too) with one entry per changed ontology. Each entry's link ends
//! with the changed ontology's id.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::parser::{self, ParseFeedError};
use termbridge_core::{redact_api_key, OntologyId, TermBridgeResult, UpstreamError};
use tracing::debug;
use url::Url;

use crate::http::UpstreamHttp;

/// One change notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub published: DateTime<Utc>,
    pub link: String,
}

impl FeedEntry {
    pub fn new(published: DateTime<Utc>, link: impl Into<String>) -> Self {
        Self {
            published,
            link: link.into(),
        }
    }

    /// The changed resource: the last non-empty path segment of the link.
    pub fn resource_id(&self) -> Option<OntologyId> {
        let path = match Url::parse(&self.link) {
            Ok(url) => url.path().to_string(),
            Err(_) => self
                .link
                .split(['?', '#'])
                .next()
                .unwrap_or_default()
                .to_string(),
        };
        path.rsplit('/')
            .find(|segment| !segment.is_empty())
            .map(OntologyId::new)
    }
}

/// Where change notifications come from.
#[async_trait]
pub trait ChangeFeedSource: Send + Sync {
    async fn fetch_entries(&self) -> TermBridgeResult<Vec<FeedEntry>>;
}

/// The link naming the changed resource: the alternate link when the
/// entry marks one, otherwise the first.
fn entry_link(entry: &feed_rs::model::Entry) -> Option<String> {
    entry
        .links
        .iter()
        .find(|link| matches!(link.rel.as_deref(), None | Some("alternate")))
        .or_else(|| entry.links.first())
        .map(|link| link.href.clone())
}

/// Parse an RSS, Atom or JSON Feed document. Entries without a date or link
/// are skipped.
pub fn parse_feed(body: &[u8]) -> Result<Vec<FeedEntry>, ParseFeedError> {
    let feed = parser::parse(body)?;
    let total = feed.entries.len();
    let entries: Vec<FeedEntry> = feed
        .entries
        .iter()
        .filter_map(|entry| {
            let published = entry.published.or(entry.updated)?;
            Some(FeedEntry::new(published, entry_link(entry)?))
        })
        .collect();
    if entries.len() < total {
        debug!(skipped = total - entries.len(), "Skipped feed entries without date or link");
    }
    Ok(entries)
}

/// Change feed fetched over HTTP with the upstream client.
#[derive(Debug)]
pub struct HttpChangeFeed {
    http: Arc<UpstreamHttp>,
    feed_url: String,
}

impl HttpChangeFeed {
    pub fn new(http: Arc<UpstreamHttp>, feed_url: impl Into<String>) -> Self {
        Self {
            http,
            feed_url: feed_url.into(),
        }
    }
}

#[async_trait]
impl ChangeFeedSource for HttpChangeFeed {
    async fn fetch_entries(&self) -> TermBridgeResult<Vec<FeedEntry>> {
        let Some(body) = self.http.get(&self.feed_url).await? else {
            return Ok(Vec::new());
        };
        parse_feed(body.as_bytes()).map_err(|e| {
            UpstreamError::InvalidResponse {
                url: redact_api_key(&self.feed_url),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Server;
    use termbridge_core::RetryConfig;

    #[test]
    fn test_resource_id_from_link() {
        let at = Utc::now();
        let cases = [
            ("http://bioportal.example.org/ontologies/1104", Some("1104")),
            ("http://bioportal.example.org/ontologies/1104/", Some("1104")),
            ("http://bioportal.example.org/visualize/1032?tab=x", Some("1032")),
            ("ontologies/42#top", Some("42")),
            ("", None),
        ];
        for (link, expected) in cases {
            let entry = FeedEntry::new(at, link);
            assert_eq!(
                entry.resource_id().as_ref().map(OntologyId::as_str),
                expected,
                "{link}"
            );
        }
    }

    #[test]
    fn test_parse_rss_feed() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Ontology changes</title>
    <link>http://host/</link>
    <description>Recently updated ontologies</description>
    <item>
      <title>ICD10</title>
      <link>http://host/ontologies/1104</link>
      <pubDate>Tue, 01 Mar 2011 10:00:00 GMT</pubDate>
    </item>
    <item>
      <title>Undated</title>
      <link>http://host/ontologies/7</link>
    </item>
  </channel>
</rss>"#;
        let entries = parse_feed(body.as_bytes()).expect("valid feed");
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].published,
            Utc.with_ymd_and_hms(2011, 3, 1, 10, 0, 0)
                .single()
                .expect("valid timestamp")
        );
        assert_eq!(entries[0].resource_id(), Some(OntologyId::new("1104")));
    }

    #[test]
    fn test_parse_atom_feed_falls_back_to_updated() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Ontology changes</title>
  <id>urn:termbridge:changes</id>
  <updated>2011-03-02T10:00:00Z</updated>
  <entry>
    <id>urn:termbridge:1032</id>
    <title>GO</title>
    <link rel="alternate" href="http://host/ontologies/1032"/>
    <updated>2011-03-02T10:00:00+02:00</updated>
  </entry>
</feed>"#;
        let entries = parse_feed(body.as_bytes()).expect("valid feed");
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].published,
            Utc.with_ymd_and_hms(2011, 3, 2, 8, 0, 0)
                .single()
                .expect("valid timestamp")
        );
        assert_eq!(entries[0].link, "http://host/ontologies/1032");
    }

    #[test]
    fn test_parse_json_feed() {
        let body = r#"{
            "version": "https://jsonfeed.org/version/1.1",
            "title": "Ontology changes",
            "items": [
                {"id": "a", "url": "http://host/ontologies/1104", "date_published": "2011-03-01T10:00:00Z"},
                {"id": "c", "url": "http://host/ontologies/7"}
            ]
        }"#;
        let entries = parse_feed(body.as_bytes()).expect("valid feed");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].link, "http://host/ontologies/1104");
    }

    #[tokio::test]
    async fn test_http_feed_invalid_body() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/feed.json")
            .with_status(200)
            .with_body("this is not a feed")
            .create_async()
            .await;

        let http = Arc::new(UpstreamHttp::with_client(
            reqwest::Client::new(),
            RetryConfig::none(),
        ));
        let feed = HttpChangeFeed::new(http, format!("{}/feed.json", server.url()));
        let err = feed.fetch_entries().await.expect_err("not a feed");
        assert!(err.to_string().contains("Invalid upstream response"));
    }

    #[tokio::test]
    async fn test_http_feed_entries() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/feed.xml")
            .with_status(200)
            .with_body(
                r#"<rss version="2.0"><channel><title>Changes</title><link>http://host/</link><description>d</description><item><title>ICD10</title><link>http://host/ontologies/1104</link><pubDate>Tue, 01 Mar 2011 10:00:00 GMT</pubDate></item></channel></rss>"#,
            )
            .create_async()
            .await;

        let http = Arc::new(UpstreamHttp::with_client(
            reqwest::Client::new(),
            RetryConfig::none(),
        ));
        let feed = HttpChangeFeed::new(http, format!("{}/feed.xml", server.url()));
        let entries = feed.fetch_entries().await.expect("entries");
        assert_eq!(entries.len(), 1);
        assert_eq!(
            entries[0].resource_id(),
            Some(OntologyId::new("1104"))
        );
    }
}
