//! The function cache engine
//!
//! `FunctionCacheEngine` answers `get`/`get_many` from the cache tiers when
//! it can and falls back to the source function for the rest, with
//! at most one in-flight fetch per key.

mod builder;
mod fetch;


pub use builder::FunctionCacheEngineBuilder;

use crate::batch::{KeepAlive, KeepAliveHandle};
use crate::source::Source;
use cachefn_config::EngineConfig;
use cachefn_core::{
    CacheError, ErrorEvent, KeyContext, KeyResult, NotificationHub, Outcome, Result, ResultEvent,
};
use cachefn_utils::tracing::cache_span;
use chrono::{DateTime, Utc};
use fetch::EngineInner;
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, Instrument};

/// Bounds every cache key type satisfies
pub trait CacheableKey: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T: Clone + fmt::Debug + Send + Sync + 'static> CacheableKey for T {}

/// Bounds every cached value type satisfies
pub trait CacheableValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> CacheableValue for T {}

type KeepAliveKeys<K> = Arc<dyn Fn() -> Vec<K> + Send + Sync>;

/// Caching wrapper around a source function
pub struct FunctionCacheEngine<K, V> {
    inner: Arc<EngineInner<K, V>>,
    keep_alive_keys: Option<KeepAliveKeys<K>>,
    keep_alive: Mutex<Option<KeepAliveHandle>>,
}

impl<K, V> FunctionCacheEngine<K, V>
where
    K: CacheableKey + Hash + Eq,
    V: CacheableValue,
{
    /// Start building an engine around `source`
    pub fn builder(source: Source<K, V>) -> FunctionCacheEngineBuilder<K, V> {
        FunctionCacheEngineBuilder::new(source)
    }
}

impl<K: CacheableKey, V: CacheableValue> FunctionCacheEngine<K, V> {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Hub for subscribing to engine notifications
    pub fn notifications(&self) -> &Arc<NotificationHub<K, V>> {
        &self.inner.hub
    }

    pub fn key_context(&self) -> &Arc<KeyContext<K>> {
        &self.inner.keys
    }

    /// Number of keys with a caller-driven fetch in progress
    pub fn in_flight(&self) -> usize {
        self.inner.requests.in_flight()
    }

    /// Get the value for `key`
    pub async fn get(&self, key: K) -> Result<V> {
        self.get_with_cancellation(key, &CancellationToken::new())
            .await
    }

    /// Get the value for `key`, giving up when `token` is cancelled
    ///
    /// Cancelling only stops this caller from waiting. A fetch shared with
    /// other callers keeps running and still populates the cache.
    pub async fn get_with_cancellation(&self, key: K, token: &CancellationToken) -> Result<V> {
        self.get_one(key, token)
            .instrument(cache_span(&self.inner.name, "get"))
            .await
    }

    async fn get_one(&self, key: K, token: &CancellationToken) -> Result<V> {
        let started_at = Utc::now();
        let timer = Instant::now();
        let cache_key = self.inner.keys.key(key.clone());
        let described = cache_key.describe();

        let result = match self.inner.resolve(vec![cache_key], token).await {
            Ok(mut results) => match results.pop() {
                Some(found) => Ok(found),
                None => {
                    let error = CacheError::missing_value(described);
                    self.inner.hub.emit_error(ErrorEvent {
                        cache_name: Arc::clone(&self.inner.name),
                        keys: vec![key.clone()],
                        error: error.clone(),
                        timestamp: Utc::now(),
                    });
                    Err(error)
                }
            },
            Err(error) => Err(error),
        };

        match result {
            Ok(found) => {
                let value = found.value.clone();
                self.emit_result(vec![key], vec![found], Outcome::Success, started_at, timer);
                Ok(value)
            }
            Err(error) => {
                debug!(cache = %self.inner.name, error = %error, "get failed");
                self.emit_result(vec![key], Vec::new(), Outcome::Failure, started_at, timer);
                Err(error)
            }
        }
    }

    /// Get values for `keys`, collected into any `(K, V)` collection
    ///
    /// Duplicate keys are requested once. Keys the source returned no value
    /// for are left out of the result.
    pub async fn get_many<C>(&self, keys: impl IntoIterator<Item = K>) -> Result<C>
    where
        C: FromIterator<(K, V)>,
    {
        self.get_many_with_cancellation(keys, &CancellationToken::new())
            .await
    }

    /// `get_many` that gives up when `token` is cancelled
    pub async fn get_many_with_cancellation<C>(
        &self,
        keys: impl IntoIterator<Item = K>,
        token: &CancellationToken,
    ) -> Result<C>
    where
        C: FromIterator<(K, V)>,
    {
        let requested: Vec<K> = keys.into_iter().collect();
        self.get_all(requested, token)
            .instrument(cache_span(&self.inner.name, "get_many"))
            .await
    }

    async fn get_all<C>(&self, requested: Vec<K>, token: &CancellationToken) -> Result<C>
    where
        C: FromIterator<(K, V)>,
    {
        let started_at = Utc::now();
        let timer = Instant::now();

        let mut seen = HashSet::with_capacity(requested.len());
        let cache_keys: Vec<_> = requested
            .iter()
            .map(|key| self.inner.keys.key(key.clone()))
            .filter(|cache_key| seen.insert(cache_key.clone()))
            .collect();

        let results = if cache_keys.is_empty() {
            Ok(Vec::new())
        } else {
            self.inner.resolve(cache_keys, token).await
        };

        match results {
            Ok(results) => {
                let collection = results
                    .iter()
                    .map(|found| (found.key.clone(), found.value.clone()))
                    .collect();
                self.emit_result(requested, results, Outcome::Success, started_at, timer);
                Ok(collection)
            }
            Err(error) => {
                debug!(cache = %self.inner.name, error = %error, "get_many failed");
                self.emit_result(requested, Vec::new(), Outcome::Failure, started_at, timer);
                Err(error)
            }
        }
    }

    /// Remove `key` from both tiers
    pub async fn remove(&self, key: K) -> Result<bool> {
        let cache_key = self.inner.keys.key(key);
        self.inner.tiers.remove(&cache_key).await
    }

    /// Start re-fetching the keep-alive key set every keep-alive interval
    ///
    /// Calling this while the loop is already running is a no-op.
    pub fn start_keep_alive(&self) -> Result<()> {
        let Some(interval) = self.inner.config.keep_alive_interval else {
            return Err(CacheError::configuration(
                "keep_alive_interval must be set to start keep-alive",
            ));
        };
        let Some(keys) = self.keep_alive_keys.clone() else {
            return Err(CacheError::configuration(
                "a keep-alive key factory must be configured to start keep-alive",
            ));
        };

        let mut slot = self.keep_alive.lock();
        if slot.as_ref().is_some_and(KeepAliveHandle::is_running) {
            return Ok(());
        }

        let engine = Arc::downgrade(&self.inner);
        let handle = KeepAlive::new(
            Arc::clone(&self.inner.name),
            interval,
            self.inner.batches,
            move || keys(),
            move |batch| {
                let engine = engine.clone();
                async move {
                    if let Some(engine) = engine.upgrade() {
                        engine.refresh(batch).await;
                    }
                }
                .boxed()
            },
        )
        .spawn();

        info!(cache = %self.inner.name, interval_ms = interval.as_millis() as u64, "keep-alive started");
        *slot = Some(handle);
        Ok(())
    }

    /// Stop the keep-alive loop, returning whether one was running
    pub fn stop_keep_alive(&self) -> bool {
        match self.keep_alive.lock().take() {
            Some(handle) => {
                handle.stop();
                info!(cache = %self.inner.name, "keep-alive stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_keep_alive_running(&self) -> bool {
        self.keep_alive
            .lock()
            .as_ref()
            .is_some_and(KeepAliveHandle::is_running)
    }

    fn emit_result(
        &self,
        requested: Vec<K>,
        results: Vec<KeyResult<K, V>>,
        outcome: Outcome,
        started_at: DateTime<Utc>,
        timer: Instant,
    ) {
        self.inner.hub.emit_result(ResultEvent {
            cache_name: Arc::clone(&self.inner.name),
            requested,
            results,
            outcome,
            started_at,
            duration: timer.elapsed(),
        });
    }
}

impl<K, V> fmt::Debug for FunctionCacheEngine<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionCacheEngine")
            .field("name", &self.inner.name)
            .field("config", &self.inner.config)
            .field("multi_key_source", &self.inner.source.is_multi_key())
            .finish()
    }
}
