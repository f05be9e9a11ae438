//! In-memory tier implementations

use super::{DistributedCache, DistributedEntry, LocalCache};
use async_trait::async_trait;
use cachefn_core::{expiry_after, BoxError, CacheEntry, CacheKey, EntryOrigin};
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::trace;

struct StoredValue<V> {
    value: V,
    expires_at: Instant,
}

/// Local tier backed by a concurrent hash map
///
/// When bounded, expired entries are purged first and then the entry
/// closest to expiry is evicted to make room.
pub struct MemoryLocalCache<K, V> {
    entries: DashMap<CacheKey<K>, StoredValue<V>>,
    max_entries: Option<usize>,
}

impl<K, V> MemoryLocalCache<K, V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: None,
        }
    }

    /// Cache holding at most `max_entries` values
    pub fn bounded(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: Some(max_entries.max(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let now = Instant::now();
        self.entries.retain(|_, stored| stored.expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

impl<K: Clone, V> MemoryLocalCache<K, V> {
    fn make_room(&self) {
        let Some(max_entries) = self.max_entries else {
            return;
        };
        if self.entries.len() < max_entries {
            return;
        }

        let purged = self.purge_expired();
        trace!(purged, "purged expired local entries");

        while self.entries.len() >= max_entries {
            let victim = self
                .entries
                .iter()
                .min_by_key(|entry| entry.value().expires_at)
                .map(|entry| entry.key().clone());
            match victim {
                Some(key) => {
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}

impl<K, V> Default for MemoryLocalCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> LocalCache<K, V> for MemoryLocalCache<K, V>
where
    K: Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn get(&self, key: &CacheKey<K>) -> Result<Option<CacheEntry<V>>, BoxError> {
        let now = Instant::now();
        if let Some(stored) = self.entries.get(key) {
            if stored.expires_at > now {
                return Ok(Some(CacheEntry::new(
                    stored.value.clone(),
                    stored.expires_at,
                    EntryOrigin::Local,
                )));
            }
        }
        self.entries
            .remove_if(key, |_, stored| stored.expires_at <= now);
        Ok(None)
    }

    fn set(&self, key: &CacheKey<K>, value: V, time_to_live: Duration) -> Result<(), BoxError> {
        if time_to_live.is_zero() {
            self.entries.remove(key);
            return Ok(());
        }
        if !self.entries.contains_key(key) {
            self.make_room();
        }
        self.entries.insert(
            key.clone(),
            StoredValue {
                value,
                expires_at: expiry_after(time_to_live),
            },
        );
        Ok(())
    }

    fn remove(&self, key: &CacheKey<K>) -> Result<bool, BoxError> {
        Ok(self.entries.remove(key).is_some())
    }
}

/// Distributed tier kept in process memory
///
/// Useful for tests and single-process deployments that still want to
/// exercise the encoded path.
#[derive(Default)]
pub struct MemoryDistributedCache {
    entries: DashMap<String, (Vec<u8>, Instant)>,
}

impl MemoryDistributedCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| entry.1 > Instant::now())
    }
}

#[async_trait]
impl DistributedCache for MemoryDistributedCache {
    async fn get(&self, key: &str) -> Result<Option<DistributedEntry>, BoxError> {
        let now = Instant::now();
        if let Some(entry) = self.entries.get(key) {
            let (bytes, expires_at) = entry.value();
            if *expires_at > now {
                return Ok(Some(DistributedEntry::new(
                    bytes.clone(),
                    expires_at.saturating_duration_since(now),
                )));
            }
        }
        self.entries
            .remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        Ok(None)
    }

    async fn set(
        &self,
        key: &str,
        value: Vec<u8>,
        time_to_live: Duration,
    ) -> Result<(), BoxError> {
        if time_to_live.is_zero() {
            self.entries.remove(key);
        } else {
            self.entries
                .insert(key.to_string(), (value, expiry_after(time_to_live)));
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<bool, BoxError> {
        Ok(self.entries.remove(key).is_some())
    }
}
