//! Cache tiers
//!
//! A local tier holds live values in process memory. A distributed tier
//! holds encoded values shared between processes. `TieredCache` reads
//! through both and writes through both, tolerating distributed failures.

mod memory;
mod tiered;


pub use memory::{MemoryDistributedCache, MemoryLocalCache};
pub use tiered::{DistributedTier, SkipRules, TierLookup, TieredCache};

use async_trait::async_trait;
use cachefn_core::{BoxError, CacheEntry, CacheKey};
use std::time::Duration;

/// In-process cache storing values as-is
///
/// Errors returned by a local cache fail the caller's request.
pub trait LocalCache<K, V>: Send + Sync {
    /// Look up an unexpired entry
    fn get(&self, key: &CacheKey<K>) -> Result<Option<CacheEntry<V>>, BoxError>;

    /// Store `value` for `time_to_live`
    fn set(&self, key: &CacheKey<K>, value: V, time_to_live: Duration) -> Result<(), BoxError>;

    /// Remove an entry, returning whether one was present
    fn remove(&self, key: &CacheKey<K>) -> Result<bool, BoxError>;
}

/// Encoded value plus its remaining time-to-live
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DistributedEntry {
    pub bytes: Vec<u8>,
    pub time_to_live: Duration,
}

impl DistributedEntry {
    pub fn new(bytes: Vec<u8>, time_to_live: Duration) -> Self {
        Self {
            bytes,
            time_to_live,
        }
    }
}

/// Remote cache keyed by serialized keys
///
/// Errors returned by a distributed cache are reported through the
/// notification hub and otherwise treated as misses.
#[async_trait]
pub trait DistributedCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<DistributedEntry>, BoxError>;

    async fn set(&self, key: &str, value: Vec<u8>, time_to_live: Duration)
        -> Result<(), BoxError>;

    async fn remove(&self, key: &str) -> Result<bool, BoxError>;

    /// Bulk read; only found keys are returned
    async fn get_many(&self, keys: &[String]) -> Result<Vec<(String, DistributedEntry)>, BoxError> {
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entry) = self.get(key).await? {
                found.push((key.clone(), entry));
            }
        }
        Ok(found)
    }

    /// Bulk write
    async fn set_many(&self, entries: Vec<(String, Vec<u8>, Duration)>) -> Result<(), BoxError> {
        for (key, value, time_to_live) in entries {
            self.set(&key, value, time_to_live).await?;
        }
        Ok(())
    }
}
