//! Notification hub dispatching cache events to subscribers

use crate::constants::DEFAULT_NOTIFICATION_CAPACITY;
use crate::events::subscriber::{SubscriptionId, SubscriptionList, SubscriptionOrdering};
use crate::events::types::{
    CacheErrorEvent, CacheGetEvent, CacheSetEvent, ErrorEvent, EventChannel, FetchEvent,
    Notification, ResultEvent,
};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Per-channel subscriber lists plus a broadcast stream of every event.
///
/// Callbacks run synchronously on the task that completed the operation.
pub struct NotificationHub<K, V> {
    result: SubscriptionList<ResultEvent<K, V>>,
    fetch: SubscriptionList<FetchEvent<K>>,
    error: SubscriptionList<ErrorEvent<K>>,
    cache_get: SubscriptionList<CacheGetEvent<K>>,
    cache_set: SubscriptionList<CacheSetEvent<K>>,
    cache_error: SubscriptionList<CacheErrorEvent<K>>,
    sender: broadcast::Sender<Notification<K, V>>,
    next_id: AtomicU64,
}

impl<K: Clone, V: Clone> NotificationHub<K, V> {
    /// Create a hub whose broadcast stream buffers `capacity` notifications
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            result: SubscriptionList::new(),
            fetch: SubscriptionList::new(),
            error: SubscriptionList::new(),
            cache_get: SubscriptionList::new(),
            cache_set: SubscriptionList::new(),
            cache_error: SubscriptionList::new(),
            sender,
            next_id: AtomicU64::new(1),
        }
    }

    fn allocate_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    pub fn on_result(
        &self,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&ResultEvent<K, V>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.allocate_id();
        self.result.add(id, ordering, callback);
        id
    }

    pub fn on_fetch(
        &self,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&FetchEvent<K>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.allocate_id();
        self.fetch.add(id, ordering, callback);
        id
    }

    pub fn on_error(
        &self,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&ErrorEvent<K>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.allocate_id();
        self.error.add(id, ordering, callback);
        id
    }

    pub fn on_cache_get(
        &self,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&CacheGetEvent<K>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.allocate_id();
        self.cache_get.add(id, ordering, callback);
        id
    }

    pub fn on_cache_set(
        &self,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&CacheSetEvent<K>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.allocate_id();
        self.cache_set.add(id, ordering, callback);
        id
    }

    pub fn on_cache_error(
        &self,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&CacheErrorEvent<K>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.allocate_id();
        self.cache_error.add(id, ordering, callback);
        id
    }

    /// Remove a subscription from whichever channel holds it
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let removed = self.result.remove(id)
            || self.fetch.remove(id)
            || self.error.remove(id)
            || self.cache_get.remove(id)
            || self.cache_set.remove(id)
            || self.cache_error.remove(id);
        if removed {
            debug!(subscription = %id, "Notification subscriber removed");
        }
        removed
    }

    pub fn subscriber_count(&self, channel: EventChannel) -> usize {
        match channel {
            EventChannel::Result => self.result.len(),
            EventChannel::Fetch => self.fetch.len(),
            EventChannel::Error => self.error.len(),
            EventChannel::CacheGet => self.cache_get.len(),
            EventChannel::CacheSet => self.cache_set.len(),
            EventChannel::CacheError => self.cache_error.len(),
        }
    }

    pub fn clear(&self, channel: EventChannel) {
        match channel {
            EventChannel::Result => self.result.clear(),
            EventChannel::Fetch => self.fetch.clear(),
            EventChannel::Error => self.error.clear(),
            EventChannel::CacheGet => self.cache_get.clear(),
            EventChannel::CacheSet => self.cache_set.clear(),
            EventChannel::CacheError => self.cache_error.clear(),
        }
    }

    /// Receive every notification emitted after this call
    pub fn observe(&self) -> broadcast::Receiver<Notification<K, V>> {
        self.sender.subscribe()
    }

    pub fn emit_result(&self, event: ResultEvent<K, V>) {
        self.result.invoke(&event);
        self.broadcast(|| Notification::Result(event));
    }

    pub fn emit_fetch(&self, event: FetchEvent<K>) {
        self.fetch.invoke(&event);
        self.broadcast(|| Notification::Fetch(event));
    }

    pub fn emit_error(&self, event: ErrorEvent<K>) {
        self.error.invoke(&event);
        self.broadcast(|| Notification::Error(event));
    }

    pub fn emit_cache_get(&self, event: CacheGetEvent<K>) {
        self.cache_get.invoke(&event);
        self.broadcast(|| Notification::CacheGet(event));
    }

    pub fn emit_cache_set(&self, event: CacheSetEvent<K>) {
        self.cache_set.invoke(&event);
        self.broadcast(|| Notification::CacheSet(event));
    }

    pub fn emit_cache_error(&self, event: CacheErrorEvent<K>) {
        self.cache_error.invoke(&event);
        self.broadcast(|| Notification::CacheError(event));
    }

    fn broadcast(&self, notification: impl FnOnce() -> Notification<K, V>) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        if let Err(e) = self.sender.send(notification()) {
            debug!("Failed to send notification to broadcast channel: {}", e);
        }
    }
}

impl<K: Clone, V: Clone> Default for NotificationHub<K, V> {
    fn default() -> Self {
        Self::new(DEFAULT_NOTIFICATION_CAPACITY)
    }
}
