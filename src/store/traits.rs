use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use futures::stream::BoxStream;

use super::error::StoreResult;

/// TTL state of a single key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyTtl {
    /// The key does not exist (anymore).
    Absent,
    /// The key exists without an expiry.
    Persistent,
    /// The key expires after the given remaining time.
    Expires(Duration),
}

impl KeyTtl {
    /// Interpret a Redis `TTL` reply: `-2` means missing, `-1` means no expiry.
    pub fn from_redis_reply(reply: i64) -> Self {
        match reply {
            -1 => KeyTtl::Persistent,
            n if n < 0 => KeyTtl::Absent,
            n => KeyTtl::Expires(Duration::from_secs(n as u64)),
        }
    }
}

/// Key-value store holding the ephemeral records.
///
/// All operations are single-key and idempotent so they can race against
/// the live application writing the same keys.
#[async_trait]
pub trait Store: Send + Sync {
    /// Short backend name for logs and reports.
    fn backend_name(&self) -> &'static str;

    /// Check that the store is reachable.
    async fn ping(&self) -> StoreResult<()>;

    /// Lazily enumerate keys matching a glob pattern.
    ///
    /// Implementations page through the keyspace rather than materialising
    /// it. Keys written during the scan may or may not appear, and a key may
    /// be yielded more than once. A failed page ends the stream with an error
    /// item.
    fn scan<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, StoreResult<String>>;

    /// Read the raw value of a key, `None` if it does not exist.
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Delete a key. Returns whether it existed.
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Read the remaining TTL of a key.
    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl>;

    /// Set the TTL of a key. Returns whether the key existed.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Server statistics as flat `field -> value` pairs.
    async fn info(&self) -> StoreResult<BTreeMap<String, String>>;
}
