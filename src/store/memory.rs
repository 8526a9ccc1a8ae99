use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicU64, Ordering},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use globset::{GlobBuilder, GlobMatcher};

use super::{
    error::{StoreError, StoreResult},
    traits::{KeyTtl, Store},
};

struct StoreEntry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl StoreEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() >= exp)
    }
}

/// In-memory store using DashMap for concurrent access.
///
/// Mirrors the Redis semantics the sweep relies on: pattern `SCAN`, lazy expiry,
/// `TTL` sentinels and `INFO` counters. Used for local runs and tests.
#[derive(Default)]
pub struct MemoryStore {
    data: DashMap<String, StoreEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a key without expiry.
    pub fn insert(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.data.insert(
            key.into(),
            StoreEntry {
                data: value.into(),
                expires_at: None,
            },
        );
    }

    /// Insert a key that expires after `ttl`.
    pub fn insert_with_ttl(&self, key: impl Into<String>, value: impl Into<Vec<u8>>, ttl: Duration) {
        self.data.insert(
            key.into(),
            StoreEntry {
                data: value.into(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
    }

    /// Whether a live (non-expired) key exists.
    pub fn contains(&self, key: &str) -> bool {
        self.data.get(key).is_some_and(|e| !e.is_expired())
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.data.iter().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn remove_if_expired(&self, key: &str) {
        self.data.remove_if(key, |_, entry| entry.is_expired());
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    fn scan<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, StoreResult<String>> {
        let matcher = match key_matcher(pattern) {
            Ok(matcher) => matcher,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        // DashMap iteration holds shard locks, so snapshot the matching keys
        // before handing them to a consumer that may write back.
        let keys: Vec<String> = self
            .data
            .iter()
            .filter(|entry| !entry.value().is_expired() && matcher.is_match(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();

        stream::iter(keys.into_iter().map(Ok)).boxed()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        self.remove_if_expired(key);
        match self.data.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.data.clone()))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        Ok(self
            .data
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired()))
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        self.remove_if_expired(key);
        let Some(entry) = self.data.get(key) else {
            return Ok(KeyTtl::Absent);
        };
        Ok(match entry.expires_at {
            None => KeyTtl::Persistent,
            Some(exp) => KeyTtl::Expires(exp.saturating_duration_since(Instant::now())),
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.remove_if_expired(key);
        match self.data.get_mut(key) {
            Some(mut entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn info(&self) -> StoreResult<BTreeMap<String, String>> {
        let used: usize = self
            .data
            .iter()
            .map(|e| e.key().len() + e.value().data.len())
            .sum();
        let keys = self.len();
        let expires = self
            .data
            .iter()
            .filter(|e| e.expires_at.is_some() && !e.is_expired())
            .count();

        Ok(BTreeMap::from([
            ("connected_clients".to_string(), "1".to_string()),
            ("used_memory".to_string(), used.to_string()),
            ("used_memory_human".to_string(), format!("{used}B")),
            (
                "keyspace_hits".to_string(),
                self.hits.load(Ordering::Relaxed).to_string(),
            ),
            (
                "keyspace_misses".to_string(),
                self.misses.load(Ordering::Relaxed).to_string(),
            ),
            ("db0".to_string(), format!("keys={keys},expires={expires}")),
        ]))
    }
}

/// Compile a Redis `MATCH` pattern: `*`, `?`, `[...]` classes and `\`
/// escapes. Keys are not paths, so `*` also crosses `/`.
fn key_matcher(pattern: &str) -> StoreResult<GlobMatcher> {
    let glob = GlobBuilder::new(pattern)
        .literal_separator(false)
        .backslash_escape(true)
        .build()
        .map_err(|e| StoreError::Internal(format!("invalid key pattern '{pattern}': {e}")))?;
    Ok(glob.compile_matcher())
}
