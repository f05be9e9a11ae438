//! Cached objects that also accept incremental updates

use super::events::{UpdateExceptionEvent, ValueUpdatedEvent};
use super::object::CachedObject;
use super::source::UpdateSource;
use super::CachedObjectState;
use cachefn_core::{CacheError, Result, SubscriptionId, SubscriptionList, SubscriptionOrdering};
use chrono::Utc;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// `CachedObject` whose value can also be changed by `update_value`
///
/// Updates and refreshes never overlap: each waits for the other to
/// finish, so an update always applies to the latest value.
pub struct CachedObjectWithUpdates<T, U> {
    object: CachedObject<T>,
    updater: Arc<dyn UpdateSource<T, U>>,
    updated: Arc<SubscriptionList<ValueUpdatedEvent<T, U>>>,
    update_failed: Arc<SubscriptionList<UpdateExceptionEvent<U>>>,
}

impl<T, U> Clone for CachedObjectWithUpdates<T, U> {
    fn clone(&self) -> Self {
        Self {
            object: self.object.clone(),
            updater: Arc::clone(&self.updater),
            updated: Arc::clone(&self.updated),
            update_failed: Arc::clone(&self.update_failed),
        }
    }
}

impl<T, U> CachedObjectWithUpdates<T, U>
where
    T: Send + Sync + 'static,
    U: Send + Sync + 'static,
{
    pub(super) fn new(object: CachedObject<T>, updater: Arc<dyn UpdateSource<T, U>>) -> Self {
        Self {
            object,
            updater,
            updated: Arc::new(SubscriptionList::new()),
            update_failed: Arc::new(SubscriptionList::new()),
        }
    }

    pub fn object(&self) -> &CachedObject<T> {
        &self.object
    }

    /// Apply `update` to the current value
    ///
    /// A failed update leaves the value unchanged and is reported both to
    /// the caller and to `on_update_exception` subscribers.
    pub async fn update_value(&self, update: U) -> Result<()> {
        let inner = &self.object.inner;
        let update = Arc::new(update);
        let _guard = inner.write_lock.lock().await;

        if inner.state() != CachedObjectState::Live {
            return Err(inner.not_live());
        }
        let Some(previous) = inner.value.load_full() else {
            return Err(CacheError::not_initialized(&*inner.name));
        };

        let started = Instant::now();
        let result = self
            .updater
            .apply(Arc::clone(&previous), Arc::clone(&update))
            .await;
        let duration = started.elapsed();

        if inner.state() == CachedObjectState::Disposed {
            debug!(object = %inner.name, "discarding update result after dispose");
            return Err(CacheError::disposed(&*inner.name));
        }

        match result {
            Ok(next) => {
                let current = Arc::new(next);
                inner.value.store(Some(Arc::clone(&current)));
                self.updated.invoke(&ValueUpdatedEvent {
                    name: Arc::clone(&inner.name),
                    previous,
                    current,
                    update,
                    duration,
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err(source) => {
                let error = CacheError::update_failed(&*inner.name, source);
                warn!(object = %inner.name, error = %error, "cached object update failed");
                self.update_failed.invoke(&UpdateExceptionEvent {
                    name: Arc::clone(&inner.name),
                    update,
                    error: error.clone(),
                    timestamp: Utc::now(),
                });
                Err(error)
            }
        }
    }

    pub fn on_value_updated(
        &self,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&ValueUpdatedEvent<T, U>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.object.inner.next_subscription_id();
        self.updated.add(id, ordering, callback);
        id
    }

    pub fn on_update_exception(
        &self,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&UpdateExceptionEvent<U>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.object.inner.next_subscription_id();
        self.update_failed.add(id, ordering, callback);
        id
    }

    /// Remove a subscription made on this object or its inner object
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.updated.remove(id) | self.update_failed.remove(id) | self.object.unsubscribe(id)
    }
}

impl<T, U> Deref for CachedObjectWithUpdates<T, U> {
    type Target = CachedObject<T>;

    fn deref(&self) -> &Self::Target {
        &self.object
    }
}

impl<T, U> fmt::Debug for CachedObjectWithUpdates<T, U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedObjectWithUpdates")
            .field("object", &self.object)
            .field("update_subscribers", &self.updated.len())
            .finish()
    }
}
