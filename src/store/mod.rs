mod error;
mod memory;
#[cfg(feature = "redis")]
mod redis;
mod traits;

use std::sync::Arc;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis::RedisStore;
pub use traits::{KeyTtl, Store};

use crate::config::StoreConfig;

/// Build the configured store. Network backends connect lazily on first use.
pub fn create_store(config: &StoreConfig) -> StoreResult<Arc<dyn Store>> {
    match config {
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory store; the sweep only sees records seeded in-process");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "redis")]
        StoreConfig::Redis(redis_config) => {
            tracing::debug!(key_prefix = %redis_config.key_prefix, "Using Redis store");
            Ok(Arc::new(RedisStore::from_config(redis_config)?))
        }
    }
}
