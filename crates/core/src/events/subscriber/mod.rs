//! Ordered subscriber lists

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// How a new subscriber is combined with the existing ones
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SubscriptionOrdering {
    /// Run after the subscribers already registered
    #[default]
    Append,
    /// Replace every subscriber already registered on the channel
    Overwrite,
}

/// Handle returned by `subscribe`, used to unsubscribe later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Callback<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Ordered list of callbacks for one event type
pub struct SubscriptionList<E> {
    entries: RwLock<Vec<(SubscriptionId, Callback<E>)>>,
}

impl<E> SubscriptionList<E> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn add(
        &self,
        id: SubscriptionId,
        ordering: SubscriptionOrdering,
        callback: impl Fn(&E) + Send + Sync + 'static,
    ) {
        let mut entries = self.entries.write();
        if ordering == SubscriptionOrdering::Overwrite {
            entries.clear();
        }
        entries.push((id, Arc::new(callback)));
    }

    /// Returns true if the subscription was registered on this list
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(existing, _)| *existing != id);
        entries.len() != before
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invoke every callback in order.
    ///
    /// The list is snapshotted first so callbacks may subscribe or
    /// unsubscribe without deadlocking. A panicking callback is logged and
    /// the remaining callbacks still run.
    pub fn invoke(&self, event: &E) {
        let snapshot: Vec<(SubscriptionId, Callback<E>)> = {
            let entries = self.entries.read();
            if entries.is_empty() {
                return;
            }
            entries.clone()
        };

        for (id, callback) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                error!(subscription = %id, "Notification subscriber panicked");
            }
        }
    }
}

impl<E> Default for SubscriptionList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> fmt::Debug for SubscriptionList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionList")
            .field("subscribers", &self.len())
            .finish()
    }
}
