//! Persistence layer.
//!
//! Caches fetched bets and mech requests in a single JSON file so that
//! repeated runs avoid redundant subgraph calls. The whole file is loaded
//! once at startup and rewritten in full on every `put`.
//!
//! Known limitation: two processes sharing the same file race, and the
//! last writer wins. The tool is meant for a single operator.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::types::{Bet, MechRequest};

/// Default cache file path.
pub const DEFAULT_CACHE_FILE: &str = ".tool_accuracy_cache.json";

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Cached records for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePayload {
    Requests(Vec<MechRequest>),
    Bets(Vec<Bet>),
}

/// A cache entry with freshness metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Unix timestamp the payload was fetched at.
    pub fetched_at: i64,
    /// Earliest timestamp the payload covers (mech requests only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_from: Option<i64>,
    #[serde(flatten)]
    pub payload: CachePayload,
}

impl CacheEntry {
    pub fn requests(fetched_at: i64, fetched_from: i64, requests: Vec<MechRequest>) -> Self {
        Self {
            fetched_at,
            fetched_from: Some(fetched_from),
            payload: CachePayload::Requests(requests),
        }
    }

    pub fn bets(fetched_at: i64, bets: Vec<Bet>) -> Self {
        Self {
            fetched_at,
            fetched_from: None,
            payload: CachePayload::Bets(bets),
        }
    }

    /// An entry is fresh while `now - fetched_at < ttl`.
    pub fn is_fresh(&self, now: i64, ttl_secs: i64) -> bool {
        now - self.fetched_at < ttl_secs
    }

    /// Whether the entry covers history starting at `since`.
    ///
    /// Entries without a watermark never count as covering.
    pub fn covers(&self, since: i64) -> bool {
        self.fetched_from.is_some_and(|from| since >= from)
    }

    pub fn as_requests(&self) -> Option<&[MechRequest]> {
        match &self.payload {
            CachePayload::Requests(r) => Some(r),
            CachePayload::Bets(_) => None,
        }
    }

    pub fn as_bets(&self) -> Option<&[Bet]> {
        match &self.payload {
            CachePayload::Bets(b) => Some(b),
            CachePayload::Requests(_) => None,
        }
    }
}

/// Cache key for an agent's mech requests on a given market source.
pub fn mech_key(source: &str, agent: &str) -> String {
    format!("mech:{source}:{agent}")
}

/// Cache key for range-bounded bets.
pub fn bets_key(source: &str, start: i64, end: i64) -> String {
    format!("bets:{source}:{start}:{end}")
}

/// Format how long ago `ts` was, e.g. `45s`, `12m`, `2h 5m`.
pub fn age_label(ts: i64, now: i64) -> String {
    let secs = (now - ts).max(0);
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

// ---------------------------------------------------------------------------
// Store abstraction
// ---------------------------------------------------------------------------

/// Key-value store for cache entries.
///
/// Implementations never fail the caller: read problems surface as a
/// miss and write problems are logged.
pub trait CacheStore: Send {
    fn get(&self, key: &str) -> Option<&CacheEntry>;

    fn put(&mut self, key: String, entry: CacheEntry);

    fn keys(&self) -> Vec<String>;
}

/// In-memory store, used in tests and when caching is disabled.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: BTreeMap<String, CacheEntry>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for MemoryCache {
    fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    fn put(&mut self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// JSON-file backed store.
#[derive(Debug)]
pub struct DiskCache {
    path: PathBuf,
    entries: BTreeMap<String, CacheEntry>,
}

impl DiskCache {
    /// Load the cache from `path`.
    ///
    /// A missing, unreadable or corrupt file yields an empty cache.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = Self::read_entries(&path);
        Self { path, entries }
    }

    fn read_entries(path: &Path) -> BTreeMap<String, CacheEntry> {
        if !path.exists() {
            info!(path = %path.display(), "No cache file found, starting empty");
            return BTreeMap::new();
        }

        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache unreadable, starting empty");
                return BTreeMap::new();
            }
        };

        match serde_json::from_str::<BTreeMap<String, CacheEntry>>(&json) {
            Ok(entries) => {
                debug!(path = %path.display(), entries = entries.len(), "Cache loaded from disk");
                entries
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Cache corrupt, starting empty");
                BTreeMap::new()
            }
        }
    }

    fn save(&self) -> Result<()> {
        let json = serde_json::to_string(&self.entries).context("Failed to serialise cache")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("Failed to write cache to {}", self.path.display()))?;
        debug!(path = %self.path.display(), entries = self.entries.len(), "Cache saved");
        Ok(())
    }

    /// Drop every entry and delete the backing file.
    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        if self.path.exists() {
            std::fs::remove_file(&self.path)
                .with_context(|| format!("Failed to delete cache file {}", self.path.display()))?;
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl CacheStore for DiskCache {
    fn get(&self, key: &str) -> Option<&CacheEntry> {
        self.entries.get(key)
    }

    fn put(&mut self, key: String, entry: CacheEntry) {
        self.entries.insert(key, entry);
        if let Err(e) = self.save() {
            warn!(error = %e, "Cache write failed, continuing without persistence");
        }
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
