//! LMDB-backed persistent response tier.
//!
//! Uses the heed crate (Rust bindings for LMDB) for a memory-mapped,
//! crash-safe key-value store holding raw upstream response bodies.
//!
//! # Layout
//!
//! One environment with two named databases:
//! - `responses`: full upstream URL -> `[cached_at millis: 8 bytes LE][body]`
//! - `meta`: small string values, currently the feed watermark
//!
//! LMDB keys are limited to 511 bytes. Longer URLs are stored under
//! `sha256:<hex digest>` of the URL.
//!
//! # Thread Safety
//!
//! Every write commits its own transaction. `purge` additionally runs under
//! a store-wide mutex so that purge-and-commit is never interleaved with
//! another purge.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use sha2::{Digest, Sha256};
use termbridge_core::{redact_api_key, StorageError, TermBridgeError, TermBridgeResult};
use tracing::debug;

use super::traits::CacheStats;
use super::watermark::{Watermark, WatermarkStore};

const RESPONSES_DB: &str = "responses";
const META_DB: &str = "meta";
const WATERMARK_KEY: &str = "feed_watermark";

/// Largest key LMDB accepts with its default build.
const MAX_KEY_BYTES: usize = 511;

const TIMESTAMP_BYTES: usize = 8;

/// A stored response body and when it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    pub body: String,
    pub cached_at: DateTime<Utc>,
}

fn txn_failed(e: heed::Error) -> TermBridgeError {
    StorageError::TransactionFailed {
        reason: e.to_string(),
    }
    .into()
}

fn storage_key(url: &str) -> Cow<'_, str> {
    if url.len() <= MAX_KEY_BYTES {
        Cow::Borrowed(url)
    } else {
        Cow::Owned(format!("sha256:{}", hex::encode(Sha256::digest(url.as_bytes()))))
    }
}

fn encode_value(body: &str, cached_at: DateTime<Utc>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(TIMESTAMP_BYTES + body.len());
    bytes.extend_from_slice(&cached_at.timestamp_millis().to_le_bytes());
    bytes.extend_from_slice(body.as_bytes());
    bytes
}

fn decode_value(bytes: &[u8]) -> TermBridgeResult<Option<CachedResponse>> {
    if bytes.len() < TIMESTAMP_BYTES {
        return Ok(None);
    }
    let (timestamp, body) = bytes.split_at(TIMESTAMP_BYTES);
    let timestamp: [u8; TIMESTAMP_BYTES] =
        timestamp
            .try_into()
            .map_err(|_| StorageError::Serialization {
                reason: "invalid timestamp".to_string(),
            })?;
    let cached_at =
        DateTime::from_timestamp_millis(i64::from_le_bytes(timestamp)).unwrap_or_else(Utc::now);
    let body = String::from_utf8(body.to_vec()).map_err(|e| StorageError::Serialization {
        reason: e.to_string(),
    })?;
    Ok(Some(CachedResponse { body, cached_at }))
}

/// LMDB-backed persistent response store.
///
/// Opened once at startup. Also persists the change feed watermark in the
/// same environment.
pub struct LmdbResponseStore {
    env: Env,
    responses: Database<Str, Bytes>,
    meta: Database<Str, Str>,
    purge_lock: Mutex<()>,
    stats: RwLock<CacheStats>,
    path: PathBuf,
}

impl LmdbResponseStore {
    /// Open (or create) the store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> TermBridgeResult<Self> {
        let path = path.as_ref();
        let open_failed = |reason: String| StorageError::OpenFailed {
            path: path.display().to_string(),
            reason,
        };

        std::fs::create_dir_all(path).map_err(|e| open_failed(e.to_string()))?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(2)
                .open(path)
        }
        .map_err(|e| open_failed(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_failed)?;
        let responses: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some(RESPONSES_DB))
            .map_err(|e| open_failed(e.to_string()))?;
        let meta: Database<Str, Str> = env
            .create_database(&mut wtxn, Some(META_DB))
            .map_err(|e| open_failed(e.to_string()))?;
        wtxn.commit().map_err(txn_failed)?;

        debug!(path = %path.display(), max_size_mb, "Opened persistent response store");

        Ok(Self {
            env,
            responses,
            meta,
            purge_lock: Mutex::new(()),
            stats: RwLock::new(CacheStats::default()),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up a stored response.
    pub fn get(&self, url: &str) -> TermBridgeResult<Option<CachedResponse>> {
        let key = storage_key(url);
        let rtxn = self.env.read_txn().map_err(txn_failed)?;
        let found = match self.responses.get(&rtxn, key.as_ref()).map_err(txn_failed)? {
            Some(bytes) => decode_value(bytes)?,
            None => None,
        };

        if let Ok(mut stats) = self.stats.write() {
            if found.is_some() {
                stats.hits += 1;
            } else {
                stats.misses += 1;
            }
        }
        Ok(found)
    }

    /// Store a response body and commit.
    pub fn put(&self, url: &str, body: &str) -> TermBridgeResult<()> {
        let key = storage_key(url);
        let value = encode_value(body, Utc::now());

        let mut wtxn = self.env.write_txn().map_err(txn_failed)?;
        self.responses
            .put(&mut wtxn, key.as_ref(), &value)
            .map_err(txn_failed)?;
        wtxn.commit().map_err(txn_failed)?;
        Ok(())
    }

    /// Remove one entry and commit immediately.
    ///
    /// Returns whether an entry was present.
    pub fn purge(&self, url: &str) -> TermBridgeResult<bool> {
        let key = storage_key(url);
        let _guard = self
            .purge_lock
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;

        let mut wtxn = self.env.write_txn().map_err(txn_failed)?;
        let deleted = self
            .responses
            .delete(&mut wtxn, key.as_ref())
            .map_err(txn_failed)?;
        wtxn.commit().map_err(txn_failed)?;

        if deleted {
            if let Ok(mut stats) = self.stats.write() {
                stats.purges += 1;
            }
        }
        debug!(url = %redact_api_key(url), deleted, "Purged persistent cache entry");
        Ok(deleted)
    }

    /// Force pending writes to disk. Called on clean shutdown.
    pub fn flush(&self) -> TermBridgeResult<()> {
        self.env.force_sync().map_err(txn_failed)
    }

    pub fn stats(&self) -> TermBridgeResult<CacheStats> {
        let rtxn = self.env.read_txn().map_err(txn_failed)?;
        let entry_count = self.responses.len(&rtxn).map_err(txn_failed)?;
        let mut stats = self
            .stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default();
        stats.entry_count = entry_count;
        Ok(stats)
    }
}

impl std::fmt::Debug for LmdbResponseStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LmdbResponseStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl WatermarkStore for LmdbResponseStore {
    async fn load(&self) -> TermBridgeResult<Option<Watermark>> {
        let rtxn = self.env.read_txn().map_err(txn_failed)?;
        match self.meta.get(&rtxn, WATERMARK_KEY).map_err(txn_failed)? {
            Some(raw) => Watermark::parse_rfc3339(raw).map(Some),
            None => Ok(None),
        }
    }

    async fn store(&self, watermark: Watermark) -> TermBridgeResult<()> {
        let raw = watermark.to_rfc3339();
        let mut wtxn = self.env.write_txn().map_err(txn_failed)?;
        self.meta
            .put(&mut wtxn, WATERMARK_KEY, &raw)
            .map_err(txn_failed)?;
        wtxn.commit().map_err(txn_failed)?;
        self.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbResponseStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store =
            LmdbResponseStore::open(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    #[test]
    fn test_put_get() {
        let (store, _dir) = create_test_store();
        let url = "http://upstream/ontologies?apikey=k";

        assert_eq!(store.get(url).expect("get"), None);
        store.put(url, "[{\"id\":1}]").expect("put");

        let cached = store.get(url).expect("get").expect("entry present");
        assert_eq!(cached.body, "[{\"id\":1}]");

        let stats = store.stats().expect("stats");
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_purge_removes_entry() {
        let (store, _dir) = create_test_store();
        let url = "http://upstream/ontologies/versions/1104?apikey=k";
        store.put(url, "body").expect("put");

        assert!(store.purge(url).expect("purge"));
        assert_eq!(store.get(url).expect("get"), None);
        assert!(!store.purge(url).expect("second purge"));
        assert_eq!(store.stats().expect("stats").purges, 1);
    }

    #[test]
    fn test_long_url_is_hashed() {
        let (store, _dir) = create_test_store();
        let url = format!("http://upstream/search/?query={}&apikey=k", "a".repeat(800));
        assert!(storage_key(&url).starts_with("sha256:"));

        store.put(&url, "hits").expect("put");
        let cached = store.get(&url).expect("get").expect("entry present");
        assert_eq!(cached.body, "hits");
    }

    #[test]
    fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let url = "http://upstream/views?apikey=k";
        {
            let store = LmdbResponseStore::open(temp_dir.path(), 10).expect("open");
            store.put(url, "views").expect("put");
            store.flush().expect("flush");
        }
        let store = LmdbResponseStore::open(temp_dir.path(), 10).expect("reopen");
        assert_eq!(
            store.get(url).expect("get").map(|c| c.body),
            Some("views".to_string())
        );
    }

    #[tokio::test]
    async fn test_watermark_persisted() {
        let (store, _dir) = create_test_store();
        assert_eq!(store.load().await.expect("load"), None);

        let wm = Watermark::new(
            Utc.with_ymd_and_hms(2011, 5, 2, 10, 30, 0)
                .single()
                .expect("valid timestamp"),
        );
        store.store(wm).await.expect("store");
        assert_eq!(store.load().await.expect("load"), Some(wm));
    }

    #[test]
    fn test_decode_rejects_truncated_value() {
        assert_eq!(decode_value(&[1, 2, 3]).expect("decode"), None);
    }
}
