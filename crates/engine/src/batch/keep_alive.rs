//! Periodic re-fetching of a caller-supplied key set
//!
//! Every interval a new cycle asks the key factory for the keys to keep
//! warm, in priority order, and refreshes them batch by batch. When a
//! cycle is still running as the next one starts, its unprocessed batches
//! are dropped so work never piles up.

use super::BatchScheduler;
use futures::future::BoxFuture;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

type KeyFactory<K> = Arc<dyn Fn() -> Vec<K> + Send + Sync>;
type RefreshBatch<K> = Arc<dyn Fn(Vec<K>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Keep-alive loop definition
pub struct KeepAlive<K> {
    name: Arc<str>,
    interval: Duration,
    scheduler: BatchScheduler,
    keys: KeyFactory<K>,
    refresh: RefreshBatch<K>,
}

impl<K: Send + 'static> KeepAlive<K> {
    pub fn new(
        name: Arc<str>,
        interval: Duration,
        scheduler: BatchScheduler,
        keys: impl Fn() -> Vec<K> + Send + Sync + 'static,
        refresh: impl Fn(Vec<K>) -> BoxFuture<'static, ()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            name,
            interval,
            scheduler,
            keys: Arc::new(keys),
            refresh: Arc::new(refresh),
        }
    }

    /// Start the loop on the current tokio runtime
    pub fn spawn(self) -> KeepAliveHandle {
        let cancel = CancellationToken::new();
        let generation = Arc::new(AtomicU64::new(0));
        let task = tokio::spawn(self.run(cancel.clone(), Arc::clone(&generation)));
        KeepAliveHandle {
            cancel,
            generation,
            task,
        }
    }

    async fn run(self, cancel: CancellationToken, generation: Arc<AtomicU64>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let cycle = generation.fetch_add(1, Ordering::SeqCst) + 1;
            let keys = (self.keys)();
            if keys.is_empty() {
                trace!(cache = %self.name, cycle, "keep-alive key factory returned no keys");
                continue;
            }

            let batches = self.scheduler.plan(keys);
            debug!(cache = %self.name, cycle, batches = batches.len(), "starting keep-alive cycle");

            let name = Arc::clone(&self.name);
            let refresh = Arc::clone(&self.refresh);
            let generation = Arc::clone(&generation);
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut batches = batches.into_iter();
                while let Some(batch) = batches.next() {
                    if cancel.is_cancelled() {
                        return;
                    }
                    if generation.load(Ordering::SeqCst) != cycle {
                        let dropped =
                            batch.len() + batches.by_ref().map(|batch| batch.len()).sum::<usize>();
                        debug!(cache = %name, cycle, dropped, "keep-alive cycle superseded, dropping unprocessed keys");
                        return;
                    }
                    refresh(batch).await;
                }
            });
        }

        debug!(cache = %self.name, "keep-alive loop stopped");
    }
}

/// Running keep-alive loop; stops when dropped
pub struct KeepAliveHandle {
    cancel: CancellationToken,
    generation: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl KeepAliveHandle {
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && !self.task.is_finished()
    }

    /// Number of cycles started so far
    pub fn cycles_started(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Drop for KeepAliveHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
