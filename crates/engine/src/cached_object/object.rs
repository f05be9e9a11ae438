//! Cached object state machine and refresh loop

use super::events::{
    DisposedEvent, InitializedEvent, RefreshExceptionEvent, RefreshOutcome, ValueRefreshedEvent,
};
use super::source::RefreshSource;
use super::CachedObjectState;
use arc_swap::ArcSwapOption;
use cachefn_core::{CacheError, Result, SubscriptionId, SubscriptionList, SubscriptionOrdering};
use cachefn_utils::apply_jitter;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

const MIN_REFRESH_DELAY: Duration = Duration::from_millis(1);

pub(super) type IntervalFactory = Arc<dyn Fn(&RefreshOutcome) -> Duration + Send + Sync>;

pub(super) struct ObjectEvents<T> {
    pub(super) initialized: SubscriptionList<InitializedEvent>,
    pub(super) refreshed: SubscriptionList<ValueRefreshedEvent<T>>,
    pub(super) refresh_failed: SubscriptionList<RefreshExceptionEvent>,
    pub(super) disposed: SubscriptionList<DisposedEvent>,
}

pub(super) struct ObjectInner<T> {
    pub(super) name: Arc<str>,
    pub(super) value: ArcSwapOption<T>,
    state: AtomicU8,
    refresh: Arc<dyn RefreshSource<T>>,
    interval: IntervalFactory,
    jitter_percentage: f64,
    /// Held for every refresh and update
    pub(super) write_lock: tokio::sync::Mutex<()>,
    /// Result of the last initialization attempt
    init_lock: tokio::sync::Mutex<Option<Result<()>>>,
    init_attempts: AtomicU64,
    last_outcome: Mutex<Option<RefreshOutcome>>,
    next_refresh_at: Mutex<Option<DateTime<Utc>>>,
    pub(super) cancel: CancellationToken,
    pub(super) events: ObjectEvents<T>,
    next_subscription: AtomicU64,
}

impl<T> ObjectInner<T> {
    pub(super) fn state(&self) -> CachedObjectState {
        CachedObjectState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(super) fn next_subscription_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed))
    }

    /// Error for operations that need a live object
    pub(super) fn not_live(&self) -> CacheError {
        match self.state() {
            CachedObjectState::Disposed => CacheError::disposed(&*self.name),
            _ => CacheError::not_initialized(&*self.name),
        }
    }
}

impl<T: Send + Sync + 'static> ObjectInner<T> {
    async fn refresh_once(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.refresh_locked().await
    }

    /// Run the refresh function; callers hold `write_lock`
    async fn refresh_locked(&self) -> Result<()> {
        if self.state() == CachedObjectState::Disposed {
            return Err(CacheError::disposed(&*self.name));
        }

        let previous = self.value.load_full();
        let started = Instant::now();
        let result = self
            .refresh
            .refresh(previous.clone(), self.cancel.clone())
            .await;
        let duration = started.elapsed();

        if self.state() == CachedObjectState::Disposed {
            debug!(object = %self.name, "discarding refresh result after dispose");
            return Err(CacheError::disposed(&*self.name));
        }

        match result {
            Ok(value) => {
                let current = Arc::new(value);
                self.value.store(Some(Arc::clone(&current)));
                self.record_outcome(true, duration);
                trace!(object = %self.name, duration_ms = duration.as_millis() as u64, "cached object refreshed");
                self.events.refreshed.invoke(&ValueRefreshedEvent {
                    name: Arc::clone(&self.name),
                    previous,
                    current,
                    duration,
                    timestamp: Utc::now(),
                });
                Ok(())
            }
            Err(source) => {
                let error = CacheError::refresh_failed(&*self.name, source);
                let outcome = self.record_outcome(false, duration);
                warn!(
                    object = %self.name,
                    consecutive_failures = outcome.consecutive_failures,
                    error = %error,
                    "cached object refresh failed, keeping previous value"
                );
                self.events.refresh_failed.invoke(&RefreshExceptionEvent {
                    name: Arc::clone(&self.name),
                    error: error.clone(),
                    consecutive_failures: outcome.consecutive_failures,
                    duration,
                    timestamp: Utc::now(),
                });
                Err(error)
            }
        }
    }

    fn record_outcome(&self, success: bool, duration: Duration) -> RefreshOutcome {
        let mut last = self.last_outcome.lock();
        let (attempts, failures) = last
            .as_ref()
            .map_or((0, 0), |outcome| (outcome.attempts, outcome.consecutive_failures));
        let outcome = RefreshOutcome {
            success,
            attempts: attempts + 1,
            consecutive_failures: if success { 0 } else { failures + 1 },
            duration,
            completed_at: Utc::now(),
        };
        *last = Some(outcome.clone());
        outcome
    }

    /// Delay until the next scheduled refresh
    fn schedule_next(&self) -> Duration {
        let outcome = self.last_outcome.lock().clone();
        let base = outcome
            .as_ref()
            .map_or(MIN_REFRESH_DELAY, |outcome| (self.interval)(outcome));
        let delay = apply_jitter(base, self.jitter_percentage).max(MIN_REFRESH_DELAY);
        *self.next_refresh_at.lock() = chrono::Duration::from_std(delay)
            .ok()
            .map(|offset| Utc::now() + offset);
        delay
    }
}

impl<T> Drop for ObjectInner<T> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_refresh_loop<T: Send + Sync + 'static>(
    object: Weak<ObjectInner<T>>,
    cancel: CancellationToken,
) {
    loop {
        let delay = match object.upgrade() {
            Some(inner) => inner.schedule_next(),
            None => break,
        };

        tokio::select! {
            () = cancel.cancelled() => break,
            () = tokio::time::sleep(delay) => {}
        }

        let Some(inner) = object.upgrade() else {
            break;
        };
        // Failures are reported through events and keep the previous value
        let _ = inner.refresh_once().await;
    }
    trace!("cached object refresh loop stopped");
}

/// A single value kept fresh by a background refresh loop
pub struct CachedObject<T> {
    pub(super) inner: Arc<ObjectInner<T>>,
}

impl<T> Clone for CachedObject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> CachedObject<T> {
    pub(super) fn new(
        name: Arc<str>,
        refresh: Arc<dyn RefreshSource<T>>,
        interval: IntervalFactory,
        jitter_percentage: f64,
    ) -> Self {
        Self {
            inner: Arc::new(ObjectInner {
                name,
                value: ArcSwapOption::empty(),
                state: AtomicU8::new(CachedObjectState::Uninitialized as u8),
                refresh,
                interval,
                jitter_percentage,
                write_lock: tokio::sync::Mutex::new(()),
                init_lock: tokio::sync::Mutex::new(None),
                init_attempts: AtomicU64::new(0),
                last_outcome: Mutex::new(None),
                next_refresh_at: Mutex::new(None),
                cancel: CancellationToken::new(),
                events: ObjectEvents {
                    initialized: SubscriptionList::new(),
                    refreshed: SubscriptionList::new(),
                    refresh_failed: SubscriptionList::new(),
                    disposed: SubscriptionList::new(),
                },
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> CachedObjectState {
        self.inner.state()
    }

    /// When the refresh loop will next run, if scheduled
    pub fn next_refresh_at(&self) -> Option<DateTime<Utc>> {
        *self.inner.next_refresh_at.lock()
    }

    pub fn last_outcome(&self) -> Option<RefreshOutcome> {
        self.inner.last_outcome.lock().clone()
    }

    /// Load the first value and start the refresh loop
    ///
    /// Calls made while an attempt is running wait for it and return its
    /// result. After a failed attempt the object stays uninitialized and
    /// `initialize` may be called again.
    pub async fn initialize(&self) -> Result<()> {
        let inner = &self.inner;
        let observed = inner.init_attempts.load(Ordering::SeqCst);
        let mut last = inner.init_lock.lock().await;
        if inner.init_attempts.load(Ordering::SeqCst) != observed {
            if let Some(result) = last.clone() {
                return result;
            }
        }

        match inner.state() {
            CachedObjectState::Live => return Ok(()),
            CachedObjectState::Disposed => return Err(CacheError::disposed(&*inner.name)),
            CachedObjectState::Uninitialized | CachedObjectState::Initializing => {}
        }

        inner
            .state
            .store(CachedObjectState::Initializing as u8, Ordering::SeqCst);
        let started = Instant::now();
        let write_guard = inner.write_lock.lock().await;
        let result = match inner.refresh_locked().await {
            Ok(()) => self.go_live(started),
            Err(error) => {
                let _ = inner.state.compare_exchange(
                    CachedObjectState::Initializing as u8,
                    CachedObjectState::Uninitialized as u8,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                Err(error)
            }
        };
        drop(write_guard);

        inner.init_attempts.fetch_add(1, Ordering::SeqCst);
        *last = Some(result.clone());
        result
    }

    fn go_live(&self, started: Instant) -> Result<()> {
        let inner = &self.inner;
        if inner
            .state
            .compare_exchange(
                CachedObjectState::Initializing as u8,
                CachedObjectState::Live as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            return Err(CacheError::disposed(&*inner.name));
        }

        tokio::spawn(run_refresh_loop(
            Arc::downgrade(inner),
            inner.cancel.clone(),
        ));

        let duration = started.elapsed();
        info!(object = %inner.name, duration_ms = duration.as_millis() as u64, "cached object initialized");
        inner.events.initialized.invoke(&InitializedEvent {
            name: Arc::clone(&inner.name),
            duration,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Current value; never waits on a refresh in progress
    pub fn value(&self) -> Result<Arc<T>> {
        if self.inner.state() != CachedObjectState::Live {
            return Err(self.inner.not_live());
        }
        self.inner
            .value
            .load_full()
            .ok_or_else(|| CacheError::not_initialized(&*self.inner.name))
    }

    /// Refresh now instead of waiting for the schedule
    ///
    /// Failures keep the previous value and are also returned here.
    pub async fn refresh_value(&self) -> Result<()> {
        if self.inner.state() != CachedObjectState::Live {
            return Err(self.inner.not_live());
        }
        self.inner.refresh_once().await
    }

    /// Stop refreshing and notify `on_disposed` subscribers
    ///
    /// Waits for a refresh or update in progress to finish. Returns `false`
    /// if the object was already disposed.
    pub async fn dispose(&self) -> bool {
        let inner = &self.inner;
        let previous = inner
            .state
            .swap(CachedObjectState::Disposed as u8, Ordering::SeqCst);
        if previous == CachedObjectState::Disposed as u8 {
            return false;
        }

        inner.cancel.cancel();
        let _guard = inner.write_lock.lock().await;
        *inner.next_refresh_at.lock() = None;
        info!(object = %inner.name, "cached object disposed");
        inner.events.disposed.invoke(&DisposedEvent {
            name: Arc::clone(&inner.name),
            timestamp: Utc::now(),
        });
        true
    }

    pub fn on_initialized(
        &self,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&InitializedEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.inner.next_subscription_id();
        self.inner.events.initialized.add(id, ordering, callback);
        id
    }

    pub fn on_value_refreshed(
        &self,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&ValueRefreshedEvent<T>) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.inner.next_subscription_id();
        self.inner.events.refreshed.add(id, ordering, callback);
        id
    }

    pub fn on_refresh_exception(
        &self,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&RefreshExceptionEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.inner.next_subscription_id();
        self.inner.events.refresh_failed.add(id, ordering, callback);
        id
    }

    pub fn on_disposed(
        &self,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&DisposedEvent) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = self.inner.next_subscription_id();
        self.inner.events.disposed.add(id, ordering, callback);
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let events = &self.inner.events;
        events.initialized.remove(id)
            | events.refreshed.remove(id)
            | events.refresh_failed.remove(id)
            | events.disposed.remove(id)
    }
}

impl<T> fmt::Debug for CachedObject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedObject")
            .field("name", &self.inner.name)
            .field("state", &self.inner.state())
            .finish()
    }
}
