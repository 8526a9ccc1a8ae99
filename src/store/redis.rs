use std::{collections::BTreeMap, time::Duration};

use async_trait::async_trait;
use futures::{
    StreamExt,
    stream::{self, BoxStream},
};
use redis::aio::MultiplexedConnection;
use tokio::sync::OnceCell;

use super::{
    error::{StoreError, StoreResult},
    traits::{KeyTtl, Store},
};
use crate::config::RedisStoreConfig;

/// Redis-backed store.
///
/// Holds a single multiplexed connection, opened on first use and shared by
/// every concurrent key operation. Dropping the store closes it.
pub struct RedisStore {
    client: redis::Client,
    connection: OnceCell<MultiplexedConnection>,
    connect_timeout: Duration,
    key_prefix: String,
    scan_count: usize,
}

impl RedisStore {
    pub fn from_config(config: &RedisStoreConfig) -> StoreResult<Self> {
        let client = redis::Client::open(config.url.as_str())?;

        Ok(Self {
            client,
            connection: OnceCell::new(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs.max(1)),
            key_prefix: config.key_prefix.clone(),
            scan_count: config.scan_count.max(1),
        })
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    fn unprefixed_key(&self, key: String) -> String {
        match key.strip_prefix(self.key_prefix.as_str()) {
            Some(stripped) if !self.key_prefix.is_empty() => stripped.to_string(),
            _ => key,
        }
    }

    async fn get_connection(&self) -> StoreResult<MultiplexedConnection> {
        let conn = self
            .connection
            .get_or_try_init(|| async {
                tokio::time::timeout(
                    self.connect_timeout,
                    self.client.get_multiplexed_async_connection(),
                )
                .await
                .map_err(|_| StoreError::Timeout(self.connect_timeout))?
                .map_err(StoreError::from)
            })
            .await?;
        Ok(conn.clone())
    }

    /// Fetch one `SCAN` page. Returns the next cursor (0 when finished) and
    /// the keys with the prefix removed.
    async fn scan_page(&self, cursor: u64, pattern: &str) -> StoreResult<(u64, Vec<String>)> {
        let mut conn = self.get_connection().await?;
        let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(self.scan_count)
            .query_async(&mut conn)
            .await?;

        let keys = keys.into_iter().map(|k| self.unprefixed_key(k)).collect();
        Ok((next, keys))
    }
}

#[async_trait]
impl Store for RedisStore {
    fn backend_name(&self) -> &'static str {
        "redis"
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    fn scan<'a>(&'a self, pattern: &'a str) -> BoxStream<'a, StoreResult<String>> {
        let pattern = self.prefixed_key(pattern);

        // `None` cursor means the previous page was the last one.
        stream::unfold(Some(0u64), move |cursor| {
            let pattern = pattern.clone();
            async move {
                let cursor = cursor?;
                match self.scan_page(cursor, &pattern).await {
                    Ok((next, keys)) => Some((Ok(keys), (next != 0).then_some(next))),
                    Err(e) => Some((Err(e), None)),
                }
            }
        })
        .flat_map(|page| match page {
            Ok(keys) => stream::iter(keys.into_iter().map(Ok)).left_stream(),
            Err(e) => stream::iter(vec![Err(e)]).right_stream(),
        })
        .boxed()
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.get_connection().await?;
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(self.prefixed_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.get_connection().await?;
        let removed: i64 = redis::cmd("DEL")
            .arg(self.prefixed_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(removed > 0)
    }

    async fn ttl(&self, key: &str) -> StoreResult<KeyTtl> {
        let mut conn = self.get_connection().await?;
        let reply: i64 = redis::cmd("TTL")
            .arg(self.prefixed_key(key))
            .query_async(&mut conn)
            .await?;
        Ok(KeyTtl::from_redis_reply(reply))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.get_connection().await?;
        let applied: i64 = redis::cmd("EXPIRE")
            .arg(self.prefixed_key(key))
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(applied == 1)
    }

    async fn info(&self) -> StoreResult<BTreeMap<String, String>> {
        let mut conn = self.get_connection().await?;
        let raw: String = redis::cmd("INFO").query_async(&mut conn).await?;
        Ok(parse_info(&raw))
    }
}

/// Parse the `INFO` text reply into `field -> value` pairs.
/// Section headers (`# Server`) and blank lines are skipped.
fn parse_info(raw: &str) -> BTreeMap<String, String> {
    raw.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
