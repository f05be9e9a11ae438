//! Builder for `FunctionCacheEngine`

use super::fetch::{DefaultValueFactory, EngineInner, MissingValueFactory};
use super::{CacheableKey, CacheableValue, FunctionCacheEngine, KeepAliveKeys};
use crate::batch::BatchScheduler;
use crate::codec::ValueCodec;
use crate::coordinator::KeyRequestCoordinator;
use crate::source::Source;
use crate::tiers::{DistributedCache, DistributedTier, LocalCache, SkipRules, TieredCache};
use crate::ttl::{TimeToLive, TtlPolicy};
use cachefn_config::{BatchFillPolicy, EngineConfig};
use cachefn_core::{
    CacheError, DefaultKeyComparer, KeyComparer, KeyContext, KeySerializer, NotificationHub,
    Result, DEFAULT_NOTIFICATION_CAPACITY,
};
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Collects the pieces of a `FunctionCacheEngine`
///
/// Scalar settings start from `EngineConfig::default()`; use
/// `with_config` to start from a loaded configuration instead.
pub struct FunctionCacheEngineBuilder<K, V> {
    config: EngineConfig,
    source: Source<K, V>,
    comparer: Arc<dyn KeyComparer<K>>,
    key_serializer: Option<Arc<dyn KeySerializer<K>>>,
    local: Option<Arc<dyn LocalCache<K, V>>>,
    distributed: Option<(Arc<dyn DistributedCache>, Arc<dyn ValueCodec<V>>)>,
    skip: SkipRules<K, V>,
    time_to_live_factory: Option<TimeToLive<K, V>>,
    on_exception: Option<DefaultValueFactory<K, V>>,
    missing_value: Option<MissingValueFactory<K, V>>,
    keep_alive_keys: Option<KeepAliveKeys<K>>,
    hub: Option<Arc<NotificationHub<K, V>>>,
}

impl<K, V> FunctionCacheEngineBuilder<K, V>
where
    K: CacheableKey + Hash + Eq,
    V: CacheableValue,
{
    pub fn new(source: Source<K, V>) -> Self {
        Self {
            config: EngineConfig::default(),
            source,
            comparer: Arc::new(DefaultKeyComparer::new()),
            key_serializer: None,
            local: None,
            distributed: None,
            skip: SkipRules::new(),
            time_to_live_factory: None,
            on_exception: None,
            missing_value: None,
            keep_alive_keys: None,
            hub: None,
        }
    }
}

impl<K: CacheableKey, V: CacheableValue> FunctionCacheEngineBuilder<K, V> {
    /// Replace every scalar setting with `config`
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn with_time_to_live(mut self, time_to_live: Duration) -> Self {
        self.config.time_to_live = time_to_live;
        self.time_to_live_factory = None;
        self
    }

    /// Choose the time-to-live per key and value
    pub fn with_time_to_live_factory(
        mut self,
        factory: impl Fn(&K, &V) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.time_to_live_factory = Some(TimeToLive::Factory(Arc::new(factory)));
        self
    }

    pub fn with_jitter_percentage(mut self, jitter_percentage: f64) -> Self {
        self.config.jitter_percentage = jitter_percentage;
        self
    }

    pub fn with_duplicate_request_catching(mut self, enabled: bool) -> Self {
        self.config.duplicate_request_catching = enabled;
        self
    }

    /// Bypass both tiers; every call goes to the source
    pub fn with_caching_disabled(mut self) -> Self {
        self.config.caching_enabled = false;
        self
    }

    pub fn with_batching(mut self, max_batch_size: usize, policy: BatchFillPolicy) -> Self {
        self.config.max_batch_size = Some(max_batch_size);
        self.config.batch_fill_policy = policy;
        self
    }

    /// Refresh entries in the background once their remaining TTL drops below `threshold`
    pub fn with_early_fetch_threshold(mut self, threshold: Duration) -> Self {
        self.config.early_fetch_threshold = Some(threshold);
        self
    }

    /// Keep the keys returned by `keys` warm, re-fetching them every `interval`
    pub fn with_keep_alive(
        mut self,
        interval: Duration,
        keys: impl Fn() -> Vec<K> + Send + Sync + 'static,
    ) -> Self {
        self.config.keep_alive_interval = Some(interval);
        self.keep_alive_keys = Some(Arc::new(keys));
        self
    }

    pub fn with_key_comparer(mut self, comparer: Arc<dyn KeyComparer<K>>) -> Self {
        self.comparer = comparer;
        self
    }

    /// Serializer for distributed-tier keys
    pub fn with_key_serializer(mut self, serializer: Arc<dyn KeySerializer<K>>) -> Self {
        self.key_serializer = Some(serializer);
        self
    }

    pub fn with_local_cache(mut self, local: Arc<dyn LocalCache<K, V>>) -> Self {
        self.local = Some(local);
        self
    }

    pub fn with_distributed_cache(
        mut self,
        cache: Arc<dyn DistributedCache>,
        codec: Arc<dyn ValueCodec<V>>,
    ) -> Self {
        self.distributed = Some((cache, codec));
        self
    }

    pub fn with_distributed_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.distributed_key_prefix = Some(prefix.into());
        self
    }

    pub fn with_skip_rules(mut self, skip: SkipRules<K, V>) -> Self {
        self.skip = skip;
        self
    }

    /// Resolve failed fetches to `default` instead of an error
    ///
    /// The default is handed to the waiting callers but never cached.
    pub fn with_continue_on_exception(
        mut self,
        default: impl Fn(&K, &CacheError) -> V + Send + Sync + 'static,
    ) -> Self {
        self.on_exception = Some(Arc::new(default));
        self
    }

    /// Supply values for keys a multi-key source leaves out
    ///
    /// Returning `None` leaves the key absent from the result.
    pub fn with_missing_key_value_factory(
        mut self,
        factory: impl Fn(&K) -> Option<V> + Send + Sync + 'static,
    ) -> Self {
        self.missing_value = Some(Arc::new(factory));
        self
    }

    /// Share a notification hub between several engines
    pub fn with_notification_hub(mut self, hub: Arc<NotificationHub<K, V>>) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn build(self) -> Result<FunctionCacheEngine<K, V>> {
        self.config.validate()?;
        if self.distributed.is_some() && self.key_serializer.is_none() {
            return Err(CacheError::configuration(
                "a key serializer is required when a distributed cache is configured",
            ));
        }
        if self.keep_alive_keys.is_some() && self.config.keep_alive_interval.is_none() {
            return Err(CacheError::configuration(
                "a keep-alive key factory needs keep_alive_interval to be set",
            ));
        }

        let name: Arc<str> = Arc::from(self.config.name.as_str());
        let hub = self
            .hub
            .unwrap_or_else(|| Arc::new(NotificationHub::new(DEFAULT_NOTIFICATION_CAPACITY)));
        let keys = Arc::new(KeyContext::new(self.comparer, self.key_serializer));

        let mut tiers = TieredCache::new(Arc::clone(&name), Arc::clone(&hub)).with_skip_rules(self.skip);
        if let Some(local) = self.local {
            tiers = tiers.with_local(local);
        }
        if let Some((cache, codec)) = self.distributed {
            let mut tier = DistributedTier::new(cache, codec);
            if let Some(prefix) = &self.config.distributed_key_prefix {
                tier = tier.with_key_prefix(prefix.clone());
            }
            tiers = tiers.with_distributed(tier);
        }

        let time_to_live = self
            .time_to_live_factory
            .unwrap_or(TimeToLive::Fixed(self.config.time_to_live));
        let ttl = TtlPolicy::new(time_to_live, self.config.jitter_percentage);
        let batches = BatchScheduler::new(self.config.max_batch_size, self.config.batch_fill_policy);

        debug!(
            cache = %name,
            local = tiers.has_local(),
            distributed = tiers.has_distributed(),
            multi_key = self.source.is_multi_key(),
            "built function cache engine"
        );

        let inner = EngineInner {
            name,
            keys,
            source: self.source,
            tiers,
            requests: KeyRequestCoordinator::new(self.config.duplicate_request_catching),
            early_fetches: KeyRequestCoordinator::new(true),
            batches,
            ttl,
            hub,
            on_exception: self.on_exception,
            missing_value: self.missing_value,
            config: self.config,
        };

        Ok(FunctionCacheEngine {
            inner: Arc::new(inner),
            keep_alive_keys: self.keep_alive_keys,
            keep_alive: Mutex::new(None),
        })
    }
}
