//! Miss handling: coalescing, batching, source dispatch and write-back

use super::{CacheableKey, CacheableValue};
use crate::batch::BatchScheduler;
use crate::coordinator::{Completion, KeyRequestCoordinator, Registration};
use crate::source::Source;
use crate::tiers::TieredCache;
use crate::ttl::TtlPolicy;
use cachefn_config::EngineConfig;
use cachefn_core::{
    BoxError, CacheEntry, CacheError, CacheKey, EntryOrigin, ErrorEvent, FetchEvent, KeyContext,
    KeyResult, NotificationHub, Outcome, Result,
};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub(crate) type DefaultValueFactory<K, V> = Arc<dyn Fn(&K, &CacheError) -> V + Send + Sync>;
pub(crate) type MissingValueFactory<K, V> = Arc<dyn Fn(&K) -> Option<V> + Send + Sync>;

/// Shared engine state, also reachable from fetch and keep-alive tasks
pub(crate) struct EngineInner<K, V> {
    pub(crate) name: Arc<str>,
    pub(crate) config: EngineConfig,
    pub(crate) keys: Arc<KeyContext<K>>,
    pub(crate) source: Source<K, V>,
    pub(crate) tiers: TieredCache<K, V>,
    /// Fetches awaited by callers and keep-alive
    pub(crate) requests: KeyRequestCoordinator<K, V>,
    /// Background refreshes of entries close to expiry
    pub(crate) early_fetches: KeyRequestCoordinator<K, V>,
    pub(crate) batches: BatchScheduler,
    pub(crate) ttl: TtlPolicy<K, V>,
    pub(crate) hub: Arc<NotificationHub<K, V>>,
    /// Set when failed fetches should resolve to a default value
    pub(crate) on_exception: Option<DefaultValueFactory<K, V>>,
    pub(crate) missing_value: Option<MissingValueFactory<K, V>>,
}

impl<K: CacheableKey, V: CacheableValue> EngineInner<K, V> {
    fn uses_tiers(&self) -> bool {
        self.config.caching_enabled && (self.tiers.has_local() || self.tiers.has_distributed())
    }

    /// Resolve distinct `keys`, returning results in the same order
    pub(crate) async fn resolve(
        self: &Arc<Self>,
        keys: Vec<CacheKey<K>>,
        token: &CancellationToken,
    ) -> Result<Vec<KeyResult<K, V>>> {
        let (hits, misses) = if self.uses_tiers() {
            match self.tiers.get_many(&keys).await {
                Ok(lookup) => (lookup.hits, lookup.misses),
                Err(error) => {
                    let affected = keys.iter().map(|key| key.key().clone()).collect();
                    self.emit_error(affected, &error);
                    return Err(error);
                }
            }
        } else {
            (Vec::new(), keys.clone())
        };

        trace!(cache = %self.name, hits = hits.len(), misses = misses.len(), "tier lookup finished");
        self.schedule_early_fetch(&hits);

        let mut resolved: HashMap<CacheKey<K>, (V, EntryOrigin)> = hits
            .into_iter()
            .map(|(key, entry)| (key, (entry.value, entry.origin)))
            .collect();

        if !misses.is_empty() {
            for (key, value) in self.fetch(misses, token).await? {
                if let Some(value) = value {
                    resolved.insert(key, (value, EntryOrigin::Fetched));
                }
            }
        }

        Ok(keys
            .into_iter()
            .filter_map(|key| {
                resolved.remove(&key).map(|(value, origin)| KeyResult {
                    key: key.into_key(),
                    value,
                    origin,
                })
            })
            .collect())
    }

    /// Re-fetch `keys` regardless of what the tiers hold
    pub(crate) async fn refresh(self: &Arc<Self>, keys: Vec<K>) {
        let keys: Vec<_> = keys.into_iter().map(|key| self.keys.key(key)).collect();
        let token = CancellationToken::new();
        match self.fetch(keys, &token).await {
            Ok(fetched) => {
                trace!(cache = %self.name, keys = fetched.len(), "keep-alive batch refreshed");
            }
            Err(error) => {
                debug!(cache = %self.name, error = %error, "keep-alive batch failed");
            }
        }
    }

    /// Join or start fetches for `keys` and wait for all of them
    async fn fetch(
        self: &Arc<Self>,
        keys: Vec<CacheKey<K>>,
        token: &CancellationToken,
    ) -> Result<Vec<(CacheKey<K>, Option<V>)>> {
        let Registration {
            waiters,
            completions,
        } = self.requests.register(keys);

        if !completions.is_empty() {
            // A coalesced fetch outlives any single caller
            let source_token = if self.requests.is_coalescing() {
                CancellationToken::new()
            } else {
                token.child_token()
            };
            self.dispatch(completions, source_token, false);
        }

        join_all(waiters.into_iter().map(|waiter| async move {
            let key = waiter.key().clone();
            waiter.wait(token).await.map(|value| (key, value))
        }))
        .await
        .into_iter()
        .collect()
    }

    fn schedule_early_fetch(self: &Arc<Self>, hits: &[(CacheKey<K>, CacheEntry<V>)]) {
        let Some(threshold) = self.config.early_fetch_threshold else {
            return;
        };
        let due: Vec<_> = hits
            .iter()
            .filter(|(_, entry)| entry.time_to_live() < threshold)
            .map(|(key, _)| key.clone())
            .collect();
        if due.is_empty() {
            return;
        }

        let Registration { completions, .. } = self.early_fetches.register(due);
        if completions.is_empty() {
            return;
        }
        debug!(cache = %self.name, keys = completions.len(), "refreshing entries close to expiry");
        self.dispatch(completions, CancellationToken::new(), true);
    }

    /// Spawn one task per batch so fetches finish even if every caller leaves
    fn dispatch(
        self: &Arc<Self>,
        completions: Vec<Completion<K, V>>,
        token: CancellationToken,
        early: bool,
    ) {
        let batches = match &self.source {
            Source::Single(_) => completions.into_iter().map(|c| vec![c]).collect(),
            Source::Multi(_) => {
                let mut window = self.batches.window();
                window.extend(completions);
                window.into_batches()
            }
        };

        for batch in batches {
            let engine = Arc::clone(self);
            let token = token.clone();
            tokio::spawn(async move { engine.run_batch(batch, token, early).await });
        }
    }

    async fn run_batch(
        self: Arc<Self>,
        batch: Vec<Completion<K, V>>,
        token: CancellationToken,
        early: bool,
    ) {
        let keys: Vec<K> = batch
            .iter()
            .map(|completion| completion.key().key().clone())
            .collect();
        let started_at = Utc::now();
        let timer = Instant::now();

        let fetched = match &self.source {
            Source::Single(source) => {
                let mut values = Vec::with_capacity(keys.len());
                let mut failure = None;
                for key in &keys {
                    match source.fetch(key.clone(), token.clone()).await {
                        Ok(value) => values.push((key.clone(), value)),
                        Err(error) => {
                            failure = Some(error);
                            break;
                        }
                    }
                }
                match failure {
                    Some(error) => Err(error),
                    None => Ok(values),
                }
            }
            Source::Multi(source) => source.fetch_many(keys.clone(), token.clone()).await,
        };

        self.hub.emit_fetch(FetchEvent {
            cache_name: Arc::clone(&self.name),
            keys: keys.clone(),
            outcome: Outcome::from_success(fetched.is_ok()),
            early,
            started_at,
            duration: timer.elapsed(),
        });

        match fetched {
            Ok(values) => self.deliver(batch, keys, values).await,
            Err(source) => self.fail(batch, keys, source, early),
        }
    }

    async fn deliver(&self, batch: Vec<Completion<K, V>>, keys: Vec<K>, values: Vec<(K, V)>) {
        let mut values: HashMap<CacheKey<K>, V> = values
            .into_iter()
            .map(|(key, value)| (self.keys.key(key), value))
            .collect();
        let mut entries = Vec::new();
        let mut resolved = Vec::with_capacity(batch.len());

        for completion in batch {
            let key = completion.key();
            let value = values.remove(key).or_else(|| {
                self.missing_value
                    .as_ref()
                    .and_then(|factory| factory(key.key()))
            });
            if let Some(value) = &value {
                if self.config.caching_enabled {
                    let time_to_live = self.ttl.compute(key.key(), value);
                    if !time_to_live.is_zero() {
                        entries.push((key.clone(), value.clone(), time_to_live));
                    }
                }
            }
            resolved.push((completion, value));
        }

        if !values.is_empty() {
            debug!(cache = %self.name, extra = values.len(), "source returned keys that were not requested");
        }

        if !entries.is_empty() {
            if let Err(error) = self.tiers.set_many(entries).await {
                warn!(cache = %self.name, error = %error, "writing fetched values failed");
                self.emit_error(keys, &error);
                for (completion, _) in resolved {
                    completion.complete(Err(error.clone()));
                }
                return;
            }
        }

        for (completion, value) in resolved {
            completion.complete(Ok(value));
        }
    }

    fn fail(&self, batch: Vec<Completion<K, V>>, keys: Vec<K>, source: BoxError, early: bool) {
        let described = batch
            .iter()
            .map(|completion| completion.key().describe())
            .collect::<Vec<_>>()
            .join(", ");
        let error = CacheError::source_function(described, source);
        warn!(cache = %self.name, keys = keys.len(), early, error = %error, "source function failed");
        self.emit_error(keys, &error);

        for completion in batch {
            let result = match &self.on_exception {
                // Defaults go to callers only and are never cached
                Some(default) if !early => Ok(Some(default(completion.key().key(), &error))),
                _ => Err(error.clone()),
            };
            completion.complete(result);
        }
    }

    fn emit_error(&self, keys: Vec<K>, error: &CacheError) {
        self.hub.emit_error(ErrorEvent {
            cache_name: Arc::clone(&self.name),
            keys,
            error: error.clone(),
            timestamp: Utc::now(),
        });
    }
}
