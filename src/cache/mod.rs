// src/cache/mod.rs
// =============================================================================
// Caching for documentation lookups.
//
// Two layers live here:
// - CacheBackend: a plain key/value store with TTLs (memory, disk, or none)
// - TwoTierCache: the documentation-aware manager on top of it, which keeps
//   the index ("table of contents") and the file contents under separate
//   keys with separate lifetimes
//
// Values are JSON strings. The backend never interprets them.
// =============================================================================

mod disk;
mod keys;
mod manager;
mod memory;

pub use disk::DiskCache;
pub use keys::KeyBuilder;
pub use manager::{CacheLookup, CacheTtls, TwoTierCache};
pub use memory::MemoryCache;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("cache entry could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Key/value store with per-entry expiry.
///
/// `get` returns `Ok(None)` for a miss, including an expired entry. A TTL of
/// zero stores the entry without expiry.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Backend used when caching is turned off: every read misses, every write
/// is dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl CacheBackend for NoopCache {
    async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Ok(None)
    }

    async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Ok(())
    }

    async fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        false
    }
}
