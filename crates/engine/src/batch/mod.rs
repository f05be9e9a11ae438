//! Grouping of missed keys into source-function batches

mod keep_alive;

pub use keep_alive::{KeepAlive, KeepAliveHandle};

use cachefn_config::BatchFillPolicy;

/// Split `items` into batches of at most `max_batch_size`
///
/// `FillBatchesEvenly` uses the fewest possible batches and keeps their
/// sizes within one of each other, larger batches first.
/// `FillFirstBatchesFully` fills every batch but the last to capacity.
/// Without a maximum everything goes into one batch.
pub fn plan_batches<T>(
    items: Vec<T>,
    max_batch_size: Option<usize>,
    policy: BatchFillPolicy,
) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let total = items.len();
    let max_batch_size = match max_batch_size {
        Some(max) if max > 0 && max < total => max,
        _ => return vec![items],
    };

    let batch_count = total.div_ceil(max_batch_size);
    let sizes: Vec<usize> = match policy {
        BatchFillPolicy::FillBatchesEvenly => {
            let base = total / batch_count;
            let larger = total % batch_count;
            (0..batch_count)
                .map(|index| if index < larger { base + 1 } else { base })
                .collect()
        }
        BatchFillPolicy::FillFirstBatchesFully => (0..batch_count)
            .map(|index| (total - index * max_batch_size).min(max_batch_size))
            .collect(),
    };

    let mut items = items.into_iter();
    sizes
        .into_iter()
        .map(|size| items.by_ref().take(size).collect())
        .collect()
}

/// Batch limits for one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchScheduler {
    max_batch_size: Option<usize>,
    policy: BatchFillPolicy,
}

impl BatchScheduler {
    pub fn new(max_batch_size: Option<usize>, policy: BatchFillPolicy) -> Self {
        Self {
            max_batch_size,
            policy,
        }
    }

    pub fn max_batch_size(&self) -> Option<usize> {
        self.max_batch_size
    }

    pub fn policy(&self) -> BatchFillPolicy {
        self.policy
    }

    pub fn plan<T>(&self, items: Vec<T>) -> Vec<Vec<T>> {
        plan_batches(items, self.max_batch_size, self.policy)
    }

    /// Start collecting items for one dispatch
    pub fn window<T>(&self) -> BatchWindow<T> {
        BatchWindow {
            scheduler: *self,
            items: Vec::new(),
        }
    }
}

/// Items collected for a single dispatch
#[derive(Debug)]
pub struct BatchWindow<T> {
    scheduler: BatchScheduler,
    items: Vec<T>,
}

impl<T> BatchWindow<T> {
    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Close the window and split its items into batches
    pub fn into_batches(self) -> Vec<Vec<T>> {
        self.scheduler.plan(self.items)
    }
}

impl<T> Extend<T> for BatchWindow<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        self.items.extend(iter);
    }
}
