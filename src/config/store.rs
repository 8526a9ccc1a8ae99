use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Key-value store configuration.
///
/// The store holds every ephemeral record family the sweep inspects.
/// Redis is the production backend; the in-memory backend exists for
/// local runs and tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum StoreConfig {
    /// In-memory store. Starts empty, so a sweep over it is a no-op
    /// unless records are seeded programmatically.
    Memory,

    /// Redis store.
    #[cfg(feature = "redis")]
    Redis(RedisStoreConfig),
}

impl Default for StoreConfig {
    fn default() -> Self {
        #[cfg(feature = "redis")]
        {
            StoreConfig::Redis(RedisStoreConfig::default())
        }
        #[cfg(not(feature = "redis"))]
        {
            StoreConfig::Memory
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            StoreConfig::Memory => Ok(()),
            #[cfg(feature = "redis")]
            StoreConfig::Redis(c) => c.validate(),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            StoreConfig::Memory => "memory",
            #[cfg(feature = "redis")]
            StoreConfig::Redis(_) => "redis",
        }
    }
}

/// Redis store configuration.
#[cfg(feature = "redis")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisStoreConfig {
    /// Redis connection URL.
    /// Format: redis://[user:password@]host:port[/database]
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_redis_timeout")]
    pub connect_timeout_secs: u64,

    /// Prefix shared by every application key.
    /// Prepended to family patterns when scanning and stripped from the
    /// keys that come back, so reports show the application's key names.
    #[serde(default)]
    pub key_prefix: String,

    /// `COUNT` hint passed to each `SCAN` page.
    #[serde(default = "default_scan_count")]
    pub scan_count: usize,
}

#[cfg(feature = "redis")]
impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            connect_timeout_secs: default_redis_timeout(),
            key_prefix: String::new(),
            scan_count: default_scan_count(),
        }
    }
}

#[cfg(feature = "redis")]
impl RedisStoreConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.url.starts_with("redis://") && !self.url.starts_with("rediss://") {
            return Err(ConfigError::Validation(format!(
                "Redis URL must start with redis:// or rediss://, got '{}'",
                self.url
            )));
        }
        if let Err(e) = redis::IntoConnectionInfo::into_connection_info(self.url.as_str()) {
            return Err(ConfigError::Validation(format!("Invalid Redis URL '{}': {e}", self.url)));
        }
        if self.scan_count == 0 {
            return Err(ConfigError::Validation(
                "store.scan_count must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(feature = "redis")]
fn default_redis_url() -> String {
    "redis://localhost:6379".into()
}

#[cfg(feature = "redis")]
fn default_redis_timeout() -> u64 {
    5
}

#[cfg(feature = "redis")]
fn default_scan_count() -> usize {
    500
}
