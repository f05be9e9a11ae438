//! Single-flight coordination of in-flight fetches
//!
//! The first caller to register a key owns a `Completion` and is
//! responsible for fetching it; later callers for the same key join the
//! pending fetch and receive the same result. A completion that is dropped
//! without being completed wakes every waiter with `FetchAbandoned`, so no
//! waiter is ever left hanging.

use cachefn_core::{CacheError, CacheKey};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// Per-key fetch result; `None` means the source produced no value
pub type FetchResult<V> = std::result::Result<Option<V>, CacheError>;

type SharedFetch<V> = Shared<BoxFuture<'static, FetchResult<V>>>;
type PendingMap<K, V> = DashMap<CacheKey<K>, PendingFetch<V>>;

struct PendingFetch<V> {
    id: u64,
    result: SharedFetch<V>,
}

/// Tracks which keys have a fetch in progress
pub struct KeyRequestCoordinator<K, V> {
    pending: Arc<PendingMap<K, V>>,
    /// When disabled every registration owns its own fetch
    coalesce: bool,
    next_id: AtomicU64,
}

/// Result of registering a set of keys
pub struct Registration<K, V> {
    /// One waiter per registered key, in registration order
    pub waiters: Vec<Waiter<K, V>>,
    /// Keys this caller must fetch
    pub completions: Vec<Completion<K, V>>,
}

impl<K, V> KeyRequestCoordinator<K, V>
where
    K: Clone + fmt::Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new(coalesce: bool) -> Self {
        Self {
            pending: Arc::new(DashMap::new()),
            coalesce,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn is_coalescing(&self) -> bool {
        self.coalesce
    }

    /// Join or start a fetch for each key
    pub fn register(&self, keys: Vec<CacheKey<K>>) -> Registration<K, V> {
        let mut waiters = Vec::with_capacity(keys.len());
        let mut completions = Vec::new();

        for key in keys {
            if !self.coalesce {
                let (sender, result) = Self::channel(&key);
                completions.push(Completion {
                    key: key.clone(),
                    id: 0,
                    sender: Some(sender),
                    pending: None,
                });
                waiters.push(Waiter {
                    key,
                    result,
                    joined: false,
                });
                continue;
            }

            match self.pending.entry(key.clone()) {
                Entry::Occupied(existing) => {
                    let result = existing.get().result.clone();
                    waiters.push(Waiter {
                        key,
                        result,
                        joined: true,
                    });
                }
                Entry::Vacant(slot) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let (sender, result) = Self::channel(&key);
                    slot.insert(PendingFetch {
                        id,
                        result: result.clone(),
                    });
                    completions.push(Completion {
                        key: key.clone(),
                        id,
                        sender: Some(sender),
                        pending: Some(Arc::downgrade(&self.pending)),
                    });
                    waiters.push(Waiter {
                        key,
                        result,
                        joined: false,
                    });
                }
            }
        }

        Registration {
            waiters,
            completions,
        }
    }

    /// Wait for the pending fetch of `key`, or start one with `fetch`
    ///
    /// The fetch runs on its own task, so it completes and clears its
    /// pending entry even if every waiter is cancelled.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: CacheKey<K>,
        fetch: F,
        token: &CancellationToken,
    ) -> FetchResult<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = FetchResult<V>> + Send + 'static,
    {
        let described = key.describe();
        let Registration {
            mut waiters,
            completions,
        } = self.register(vec![key]);

        if let Some(completion) = completions.into_iter().next() {
            let pending = fetch();
            tokio::spawn(async move { completion.complete(pending.await) });
        }

        match waiters.pop() {
            Some(waiter) => waiter.wait(token).await,
            None => Err(CacheError::fetch_abandoned(described)),
        }
    }

    /// Number of keys with a fetch in progress
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, key: &CacheKey<K>) -> bool {
        self.pending.contains_key(key)
    }

    fn channel(key: &CacheKey<K>) -> (oneshot::Sender<FetchResult<V>>, SharedFetch<V>) {
        let (sender, receiver) = oneshot::channel();
        let described = key.describe();
        let result = receiver
            .map(move |received| {
                received.unwrap_or_else(|_| Err(CacheError::fetch_abandoned(described)))
            })
            .boxed()
            .shared();
        (sender, result)
    }
}

/// Handle on the shared result of a fetch
pub struct Waiter<K, V> {
    key: CacheKey<K>,
    result: SharedFetch<V>,
    joined: bool,
}

impl<K, V> Waiter<K, V>
where
    K: fmt::Debug,
    V: Clone,
{
    pub fn key(&self) -> &CacheKey<K> {
        &self.key
    }

    /// Whether this waiter joined a fetch started by another caller
    pub fn joined_existing(&self) -> bool {
        self.joined
    }

    /// Wait for the fetch, giving up when `token` is cancelled
    ///
    /// Giving up only detaches this waiter; the fetch and any other waiters
    /// are unaffected.
    pub async fn wait(self, token: &CancellationToken) -> FetchResult<V> {
        tokio::select! {
            biased;
            result = self.result => result,
            () = token.cancelled() => Err(CacheError::cancelled(self.key.describe())),
        }
    }
}

/// Obligation to deliver the result for one key
pub struct Completion<K, V> {
    key: CacheKey<K>,
    id: u64,
    sender: Option<oneshot::Sender<FetchResult<V>>>,
    pending: Option<Weak<PendingMap<K, V>>>,
}

impl<K, V> Completion<K, V> {
    pub fn key(&self) -> &CacheKey<K> {
        &self.key
    }

    /// Deliver `result` to every waiter and clear the pending entry
    pub fn complete(mut self, result: FetchResult<V>) {
        self.release();
        if let Some(sender) = self.sender.take() {
            // Every waiter may already have given up
            let _ = sender.send(result);
        }
    }

    fn release(&mut self) {
        if let Some(pending) = self.pending.take().and_then(|pending| pending.upgrade()) {
            pending.remove_if(&self.key, |_, fetch| fetch.id == self.id);
        }
    }
}

impl<K, V> Drop for Completion<K, V> {
    fn drop(&mut self) {
        self.release();
    }
}
