//! Read-through, write-through composition of the local and distributed tiers

use super::{DistributedCache, DistributedEntry, LocalCache};
use crate::codec::ValueCodec;
use cachefn_core::{
    CacheEntry, CacheError, CacheErrorEvent, CacheGetEvent, CacheKey, CacheSetEvent, CacheTier,
    EntryOrigin, NotificationHub, Outcome, Result, SkipTiers,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

type KeyPredicate<K> = Arc<dyn Fn(&K) -> bool + Send + Sync>;
type EntryPredicate<K, V> = Arc<dyn Fn(&K, &V) -> bool + Send + Sync>;

/// Distributed cache plus the codec and key prefix used with it
pub struct DistributedTier<V> {
    cache: Arc<dyn DistributedCache>,
    codec: Arc<dyn ValueCodec<V>>,
    key_prefix: Option<String>,
}

impl<V> DistributedTier<V> {
    pub fn new(cache: Arc<dyn DistributedCache>, codec: Arc<dyn ValueCodec<V>>) -> Self {
        Self {
            cache,
            codec,
            key_prefix: None,
        }
    }

    /// Prefix prepended to every serialized key
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.key_prefix = (!prefix.is_empty()).then_some(prefix);
        self
    }

    fn storage_key(&self, serialized: &str) -> String {
        match &self.key_prefix {
            Some(prefix) => format!("{prefix}{serialized}"),
            None => serialized.to_string(),
        }
    }
}

/// Per-key rules for bypassing tiers on read or write
pub struct SkipRules<K, V> {
    get: Vec<(SkipTiers, KeyPredicate<K>)>,
    set: Vec<(SkipTiers, EntryPredicate<K, V>)>,
}

impl<K, V> SkipRules<K, V> {
    pub fn new() -> Self {
        Self {
            get: Vec::new(),
            set: Vec::new(),
        }
    }

    /// Skip reading `tiers` for keys matching `predicate`
    pub fn skip_get_when(
        mut self,
        tiers: SkipTiers,
        predicate: impl Fn(&K) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.get.push((tiers, Arc::new(predicate)));
        self
    }

    /// Skip writing `tiers` for entries matching `predicate`
    pub fn skip_set_when(
        mut self,
        tiers: SkipTiers,
        predicate: impl Fn(&K, &V) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.set.push((tiers, Arc::new(predicate)));
        self
    }

    /// Skip writing `tiers` for keys matching `predicate`, whatever the value
    pub fn skip_set_when_key(
        self,
        tiers: SkipTiers,
        predicate: impl Fn(&K) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.skip_set_when(tiers, move |key, _| predicate(key))
    }

    pub fn should_skip_get(&self, tier: CacheTier, key: &K) -> bool {
        self.get
            .iter()
            .any(|(tiers, predicate)| tiers.covers(tier) && predicate(key))
    }

    pub fn should_skip_set(&self, tier: CacheTier, key: &K, value: &V) -> bool {
        self.set
            .iter()
            .any(|(tiers, predicate)| tiers.covers(tier) && predicate(key, value))
    }

    pub fn is_empty(&self) -> bool {
        self.get.is_empty() && self.set.is_empty()
    }
}

impl<K, V> Default for SkipRules<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> fmt::Debug for SkipRules<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SkipRules")
            .field("get", &self.get.len())
            .field("set", &self.set.len())
            .finish()
    }
}

/// Outcome of a tiered read
pub struct TierLookup<K, V> {
    pub hits: Vec<(CacheKey<K>, CacheEntry<V>)>,
    pub misses: Vec<CacheKey<K>>,
}

/// Local and distributed tiers behind one read/write surface
pub struct TieredCache<K, V> {
    name: Arc<str>,
    local: Option<Arc<dyn LocalCache<K, V>>>,
    distributed: Option<DistributedTier<V>>,
    skip: SkipRules<K, V>,
    hub: Arc<NotificationHub<K, V>>,
}

impl<K, V> TieredCache<K, V>
where
    K: Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(name: Arc<str>, hub: Arc<NotificationHub<K, V>>) -> Self {
        Self {
            name,
            local: None,
            distributed: None,
            skip: SkipRules::new(),
            hub,
        }
    }

    pub fn with_local(mut self, local: Arc<dyn LocalCache<K, V>>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_distributed(mut self, distributed: DistributedTier<V>) -> Self {
        self.distributed = Some(distributed);
        self
    }

    pub fn with_skip_rules(mut self, skip: SkipRules<K, V>) -> Self {
        self.skip = skip;
        self
    }

    pub fn has_local(&self) -> bool {
        self.local.is_some()
    }

    pub fn has_distributed(&self) -> bool {
        self.distributed.is_some()
    }

    /// Read one key through both tiers
    pub async fn get(&self, key: &CacheKey<K>) -> Result<Option<CacheEntry<V>>> {
        let lookup = self.get_many(std::slice::from_ref(key)).await?;
        Ok(lookup.hits.into_iter().next().map(|(_, entry)| entry))
    }

    /// Write one value through both tiers
    pub async fn set(&self, key: CacheKey<K>, value: V, time_to_live: Duration) -> Result<()> {
        self.set_many(vec![(key, value, time_to_live)]).await
    }

    /// Read `keys` from the local tier, then the distributed tier
    ///
    /// Distributed hits are copied into the local tier with their remaining
    /// time-to-live. Local failures and undecodable values are returned as
    /// errors; distributed failures turn into misses.
    pub async fn get_many(&self, keys: &[CacheKey<K>]) -> Result<TierLookup<K, V>> {
        let mut hits = Vec::new();
        let mut pending = keys.to_vec();

        if let Some(local) = &self.local {
            pending = self.read_local(local.as_ref(), pending, &mut hits)?;
        }

        if let Some(tier) = &self.distributed {
            if !pending.is_empty() {
                pending = self.read_distributed(tier, pending, &mut hits).await?;
            }
        }

        Ok(TierLookup {
            hits,
            misses: pending,
        })
    }

    /// Write entries through both tiers
    ///
    /// Entries with a zero time-to-live are skipped. Values are encoded
    /// before anything is written so a codec failure leaves both tiers
    /// untouched.
    pub async fn set_many(&self, entries: Vec<(CacheKey<K>, V, Duration)>) -> Result<()> {
        let entries: Vec<_> = entries
            .into_iter()
            .filter(|(_, _, time_to_live)| !time_to_live.is_zero())
            .collect();
        if entries.is_empty() {
            return Ok(());
        }

        let encoded = match &self.distributed {
            Some(tier) => Some(self.encode_entries(tier, &entries)?),
            None => None,
        };

        if let Some(local) = &self.local {
            self.write_local(local.as_ref(), entries)?;
        }

        if let (Some(tier), Some(encoded)) = (&self.distributed, encoded) {
            self.write_distributed(tier, encoded).await;
        }

        Ok(())
    }

    /// Remove `key` from both tiers
    pub async fn remove(&self, key: &CacheKey<K>) -> Result<bool> {
        let mut removed = false;

        if let Some(local) = &self.local {
            match local.remove(key) {
                Ok(found) => removed |= found,
                Err(source) => {
                    let error = CacheError::backend(CacheTier::Local, "remove", source);
                    self.report_tier_error(CacheTier::Local, "remove", vec![key.key().clone()], &error);
                    return Err(error);
                }
            }
        }

        if let Some(tier) = &self.distributed {
            let storage_key = tier.storage_key(key.serialized()?);
            match tier.cache.remove(&storage_key).await {
                Ok(found) => removed |= found,
                Err(source) => {
                    let error = CacheError::backend(CacheTier::Distributed, "remove", source);
                    warn!(cache = %self.name, key = %storage_key, error = %error, "distributed cache remove failed");
                    self.report_tier_error(
                        CacheTier::Distributed,
                        "remove",
                        vec![key.key().clone()],
                        &error,
                    );
                }
            }
        }

        Ok(removed)
    }

    fn read_local(
        &self,
        local: &dyn LocalCache<K, V>,
        keys: Vec<CacheKey<K>>,
        hits: &mut Vec<(CacheKey<K>, CacheEntry<V>)>,
    ) -> Result<Vec<CacheKey<K>>> {
        let (eligible, mut remaining): (Vec<_>, Vec<_>) = keys
            .into_iter()
            .partition(|key| !self.skip.should_skip_get(CacheTier::Local, key.key()));
        if eligible.is_empty() {
            return Ok(remaining);
        }

        let started_at = Utc::now();
        let timer = Instant::now();
        let mut hit_keys = Vec::new();
        let mut miss_keys = Vec::new();

        for key in eligible {
            match local.get(&key) {
                Ok(Some(entry)) if !entry.is_expired() => {
                    hit_keys.push(key.key().clone());
                    hits.push((key, entry));
                }
                Ok(_) => {
                    miss_keys.push(key.key().clone());
                    remaining.push(key);
                }
                Err(source) => {
                    let error = CacheError::backend(CacheTier::Local, "get", source);
                    self.report_tier_error(CacheTier::Local, "get", vec![key.key().clone()], &error);
                    miss_keys.push(key.key().clone());
                    self.emit_get(
                        CacheTier::Local,
                        hit_keys,
                        miss_keys,
                        Outcome::Failure,
                        started_at,
                        timer,
                    );
                    return Err(error);
                }
            }
        }

        self.emit_get(
            CacheTier::Local,
            hit_keys,
            miss_keys,
            Outcome::Success,
            started_at,
            timer,
        );
        Ok(remaining)
    }

    async fn read_distributed(
        &self,
        tier: &DistributedTier<V>,
        keys: Vec<CacheKey<K>>,
        hits: &mut Vec<(CacheKey<K>, CacheEntry<V>)>,
    ) -> Result<Vec<CacheKey<K>>> {
        let (eligible, mut remaining): (Vec<_>, Vec<_>) = keys
            .into_iter()
            .partition(|key| !self.skip.should_skip_get(CacheTier::Distributed, key.key()));
        if eligible.is_empty() {
            return Ok(remaining);
        }

        let storage_keys = eligible
            .iter()
            .map(|key| key.serialized().map(|serialized| tier.storage_key(serialized)))
            .collect::<Result<Vec<_>>>()?;

        let started_at = Utc::now();
        let timer = Instant::now();

        let found = match tier.cache.get_many(&storage_keys).await {
            Ok(found) => found,
            Err(source) => {
                let error = CacheError::backend(CacheTier::Distributed, "get", source);
                warn!(cache = %self.name, keys = eligible.len(), error = %error, "distributed cache read failed, treating as miss");
                let miss_keys: Vec<K> = eligible.iter().map(|key| key.key().clone()).collect();
                self.report_tier_error(CacheTier::Distributed, "get", miss_keys.clone(), &error);
                self.emit_get(
                    CacheTier::Distributed,
                    Vec::new(),
                    miss_keys,
                    Outcome::Failure,
                    started_at,
                    timer,
                );
                remaining.extend(eligible);
                return Ok(remaining);
            }
        };

        let mut found: HashMap<String, DistributedEntry> = found.into_iter().collect();
        let mut hit_keys = Vec::new();
        let mut miss_keys = Vec::new();
        let mut populate = Vec::new();

        for (key, storage_key) in eligible.into_iter().zip(storage_keys) {
            match found.remove(&storage_key) {
                Some(entry) if !entry.time_to_live.is_zero() => {
                    let value = tier
                        .codec
                        .decode(&entry.bytes)
                        .map_err(|e| e.with_key(storage_key))?;
                    hit_keys.push(key.key().clone());
                    populate.push((key.clone(), value.clone(), entry.time_to_live));
                    hits.push((
                        key,
                        CacheEntry::expiring_in(value, entry.time_to_live, EntryOrigin::Distributed),
                    ));
                }
                _ => {
                    miss_keys.push(key.key().clone());
                    remaining.push(key);
                }
            }
        }

        self.emit_get(
            CacheTier::Distributed,
            hit_keys,
            miss_keys,
            Outcome::Success,
            started_at,
            timer,
        );

        if let Some(local) = &self.local {
            if !populate.is_empty() {
                debug!(cache = %self.name, keys = populate.len(), "populating local tier from distributed hits");
                self.write_local(local.as_ref(), populate)?;
            }
        }

        Ok(remaining)
    }

    fn write_local(
        &self,
        local: &dyn LocalCache<K, V>,
        entries: Vec<(CacheKey<K>, V, Duration)>,
    ) -> Result<()> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let mut written = Vec::new();
        let mut longest = Duration::ZERO;

        for (key, value, time_to_live) in entries {
            if self
                .skip
                .should_skip_set(CacheTier::Local, key.key(), &value)
            {
                continue;
            }
            if let Err(source) = local.set(&key, value, time_to_live) {
                let error = CacheError::backend(CacheTier::Local, "set", source);
                self.report_tier_error(CacheTier::Local, "set", vec![key.key().clone()], &error);
                written.push(key.key().clone());
                self.emit_set(
                    CacheTier::Local,
                    written,
                    longest.max(time_to_live),
                    Outcome::Failure,
                    started_at,
                    timer,
                );
                return Err(error);
            }
            longest = longest.max(time_to_live);
            written.push(key.into_key());
        }

        if !written.is_empty() {
            self.emit_set(
                CacheTier::Local,
                written,
                longest,
                Outcome::Success,
                started_at,
                timer,
            );
        }
        Ok(())
    }

    fn encode_entries(
        &self,
        tier: &DistributedTier<V>,
        entries: &[(CacheKey<K>, V, Duration)],
    ) -> Result<Vec<(K, String, Vec<u8>, Duration)>> {
        let mut encoded = Vec::with_capacity(entries.len());
        for (key, value, time_to_live) in entries {
            if self
                .skip
                .should_skip_set(CacheTier::Distributed, key.key(), value)
            {
                continue;
            }
            let storage_key = tier.storage_key(key.serialized()?);
            let bytes = tier
                .codec
                .encode(value)
                .map_err(|e| e.with_key(storage_key.clone()))?;
            encoded.push((key.key().clone(), storage_key, bytes, *time_to_live));
        }
        Ok(encoded)
    }

    async fn write_distributed(
        &self,
        tier: &DistributedTier<V>,
        encoded: Vec<(K, String, Vec<u8>, Duration)>,
    ) {
        if encoded.is_empty() {
            return;
        }

        let started_at = Utc::now();
        let timer = Instant::now();
        let longest = encoded
            .iter()
            .map(|(_, _, _, time_to_live)| *time_to_live)
            .max()
            .unwrap_or_default();
        let (keys, payloads): (Vec<K>, Vec<_>) = encoded
            .into_iter()
            .map(|(key, storage_key, bytes, time_to_live)| (key, (storage_key, bytes, time_to_live)))
            .unzip();

        match tier.cache.set_many(payloads).await {
            Ok(()) => {
                self.emit_set(
                    CacheTier::Distributed,
                    keys,
                    longest,
                    Outcome::Success,
                    started_at,
                    timer,
                );
            }
            Err(source) => {
                let error = CacheError::backend(CacheTier::Distributed, "set", source);
                warn!(cache = %self.name, keys = keys.len(), error = %error, "distributed cache write failed");
                self.report_tier_error(CacheTier::Distributed, "set", keys.clone(), &error);
                self.emit_set(
                    CacheTier::Distributed,
                    keys,
                    longest,
                    Outcome::Failure,
                    started_at,
                    timer,
                );
            }
        }
    }

    fn emit_get(
        &self,
        tier: CacheTier,
        hits: Vec<K>,
        misses: Vec<K>,
        outcome: Outcome,
        started_at: DateTime<Utc>,
        timer: Instant,
    ) {
        self.hub.emit_cache_get(CacheGetEvent {
            cache_name: Arc::clone(&self.name),
            tier,
            hits,
            misses,
            outcome,
            started_at,
            duration: timer.elapsed(),
        });
    }

    fn emit_set(
        &self,
        tier: CacheTier,
        keys: Vec<K>,
        time_to_live: Duration,
        outcome: Outcome,
        started_at: DateTime<Utc>,
        timer: Instant,
    ) {
        self.hub.emit_cache_set(CacheSetEvent {
            cache_name: Arc::clone(&self.name),
            tier,
            keys,
            time_to_live,
            outcome,
            started_at,
            duration: timer.elapsed(),
        });
    }

    fn report_tier_error(
        &self,
        tier: CacheTier,
        operation: &'static str,
        keys: Vec<K>,
        error: &CacheError,
    ) {
        self.hub.emit_cache_error(CacheErrorEvent {
            cache_name: Arc::clone(&self.name),
            tier,
            operation,
            keys,
            error: error.clone(),
            timestamp: Utc::now(),
        });
    }
}
