//! End-to-end behaviour of `FunctionCacheEngine` against in-memory tiers

use async_trait::async_trait;
use cachefn_config::BatchFillPolicy;
use cachefn_core::{BoxError, CacheError, EntryOrigin, KeySerializer, SubscriptionOrdering};
use cachefn_engine::{
    multi_source_fn, source_fn, BincodeCodec, CancellationToken, DistributedCache,
    DistributedEntry, FunctionCacheEngine, JsonCodec, MemoryDistributedCache, MemoryLocalCache,
    Source,
};
use cachefn_utils::tracing::init_for_tests;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn user_key_serializer() -> Arc<dyn KeySerializer<u32>> {
    Arc::new(|key: &u32| format!("user:{key}"))
}

/// Single-key source that counts calls and answers after `delay`
fn slow_source(calls: Arc<AtomicUsize>, delay: Duration) -> Source<u32, String> {
    source_fn(move |key: u32, _token| {
        let calls = Arc::clone(&calls);
        async move {
            let call = calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep(delay).await;
            Ok::<_, BoxError>(format!("value-{key}-{call}"))
        }
    })
}

/// Multi-key source that records every batch it receives
fn recording_source(batches: Arc<Mutex<Vec<Vec<u32>>>>) -> Source<u32, String> {
    multi_source_fn(move |keys: Vec<u32>, _token| {
        let batches = Arc::clone(&batches);
        async move {
            batches.lock().push(keys.clone());
            Ok::<_, BoxError>(keys.into_iter().map(|k| (k, format!("value-{k}"))).collect())
        }
    })
}

/// Wait until `condition` holds, giving up after roughly one second
async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_gets_share_one_fetch() {
    init_for_tests();
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = Arc::new(
        FunctionCacheEngine::builder(slow_source(Arc::clone(&calls), Duration::from_millis(50)))
            .with_local_cache(Arc::new(MemoryLocalCache::new()))
            .build()
            .unwrap(),
    );

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.get(7).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), "value-7-1");
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.in_flight(), 0);
}

#[tokio::test]
async fn test_get_many_fetches_only_missing_keys_in_order() {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let engine = FunctionCacheEngine::builder(recording_source(Arc::clone(&batches)))
        .with_local_cache(Arc::new(MemoryLocalCache::new()))
        .build()
        .unwrap();

    assert_eq!(engine.get(1).await.unwrap(), "value-1");

    let values: Vec<(u32, String)> = engine.get_many([1, 2, 3]).await.unwrap();
    assert_eq!(
        values,
        vec![
            (1, "value-1".to_string()),
            (2, "value-2".to_string()),
            (3, "value-3".to_string()),
        ]
    );
    assert_eq!(*batches.lock(), vec![vec![1], vec![2, 3]]);
}

#[tokio::test]
async fn test_get_many_deduplicates_and_collects_into_any_shape() {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let engine = FunctionCacheEngine::builder(recording_source(Arc::clone(&batches)))
        .build()
        .unwrap();

    let ordered: Vec<(u32, String)> = engine.get_many([3, 1, 3, 2, 1]).await.unwrap();
    let keys: Vec<u32> = ordered.iter().map(|(key, _)| *key).collect();
    assert_eq!(keys, vec![3, 1, 2]);
    assert_eq!(*batches.lock(), vec![vec![3, 1, 2]]);

    let by_key: HashMap<u32, String> = engine.get_many([4, 5, 4]).await.unwrap();
    assert_eq!(by_key.len(), 2);
    assert_eq!(by_key[&5], "value-5");
}

#[tokio::test]
async fn test_expired_entries_are_fetched_again() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = FunctionCacheEngine::builder(slow_source(Arc::clone(&calls), Duration::ZERO))
        .with_time_to_live(Duration::from_millis(100))
        .with_local_cache(Arc::new(MemoryLocalCache::new()))
        .build()
        .unwrap();

    assert_eq!(engine.get(1).await.unwrap(), "value-1-1");
    assert_eq!(engine.get(1).await.unwrap(), "value-1-1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(engine.get(1).await.unwrap(), "value-1-2");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_unbounded_ttl_is_cached_in_both_tiers() {
    let calls = Arc::new(AtomicUsize::new(0));
    let remote = Arc::new(MemoryDistributedCache::new());
    let engine = FunctionCacheEngine::builder(slow_source(Arc::clone(&calls), Duration::ZERO))
        .with_time_to_live(Duration::MAX)
        .with_jitter_percentage(10.0)
        .with_key_serializer(user_key_serializer())
        .with_local_cache(Arc::new(MemoryLocalCache::new()))
        .with_distributed_cache(remote.clone(), Arc::new(JsonCodec))
        .build()
        .unwrap();

    assert_eq!(engine.get(1).await.unwrap(), "value-1-1");
    assert_eq!(engine.get(1).await.unwrap(), "value-1-1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(remote.contains_key("user:1"));
    assert_eq!(engine.in_flight(), 0);
}

/// Distributed cache whose reads always fail
#[derive(Default)]
struct UnreachableReads {
    inner: MemoryDistributedCache,
}

#[async_trait]
impl DistributedCache for UnreachableReads {
    async fn get(&self, _key: &str) -> Result<Option<DistributedEntry>, BoxError> {
        Err("connection refused".into())
    }

    async fn set(&self, key: &str, value: Vec<u8>, time_to_live: Duration) -> Result<(), BoxError> {
        self.inner.set(key, value, time_to_live).await
    }

    async fn remove(&self, key: &str) -> Result<bool, BoxError> {
        self.inner.remove(key).await
    }
}

#[tokio::test]
async fn test_distributed_read_failure_falls_back_to_source() {
    init_for_tests();
    let calls = Arc::new(AtomicUsize::new(0));
    let remote = Arc::new(UnreachableReads::default());
    let engine = FunctionCacheEngine::builder(slow_source(Arc::clone(&calls), Duration::ZERO))
        .with_key_serializer(user_key_serializer())
        .with_distributed_cache(remote.clone(), Arc::new(JsonCodec))
        .build()
        .unwrap();

    let tier_errors = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&tier_errors);
    engine
        .notifications()
        .on_cache_error(SubscriptionOrdering::Append, move |event| {
            assert_eq!(event.keys, vec![9]);
            assert!(event.error.is_tolerated());
            counter.fetch_add(1, Ordering::SeqCst);
        });

    assert_eq!(engine.get(9).await.unwrap(), "value-9-1");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(tier_errors.load(Ordering::SeqCst), 1);
    assert!(remote.inner.contains_key("user:9"));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
    id: u32,
    display_name: String,
    tags: Vec<String>,
}

fn profile_source(calls: Arc<AtomicUsize>) -> Source<u32, Profile> {
    source_fn(move |id: u32, _token| {
        let calls = Arc::clone(&calls);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(Profile {
                id,
                display_name: format!("user {id}"),
                tags: vec!["beta".to_string()],
            })
        }
    })
}

#[tokio::test]
async fn test_engines_share_values_through_distributed_tier() {
    let remote = Arc::new(MemoryDistributedCache::new());
    let writer_calls = Arc::new(AtomicUsize::new(0));
    let reader_calls = Arc::new(AtomicUsize::new(0));

    let writer = FunctionCacheEngine::builder(profile_source(Arc::clone(&writer_calls)))
        .with_name("writer")
        .with_key_serializer(user_key_serializer())
        .with_distributed_cache(remote.clone(), Arc::new(BincodeCodec))
        .with_distributed_key_prefix("profiles:")
        .build()
        .unwrap();
    let reader = FunctionCacheEngine::builder(profile_source(Arc::clone(&reader_calls)))
        .with_name("reader")
        .with_key_serializer(user_key_serializer())
        .with_local_cache(Arc::new(MemoryLocalCache::new()))
        .with_distributed_cache(remote.clone(), Arc::new(BincodeCodec))
        .with_distributed_key_prefix("profiles:")
        .build()
        .unwrap();

    let written = writer.get(42).await.unwrap();
    assert!(remote.contains_key("profiles:user:42"));

    let origins = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&origins);
    reader
        .notifications()
        .on_result(SubscriptionOrdering::Append, move |event| {
            sink.lock()
                .extend(event.results.iter().map(|result| result.origin));
        });

    assert_eq!(reader.get(42).await.unwrap(), written);
    assert_eq!(reader.get(42).await.unwrap(), written);
    assert_eq!(reader_calls.load(Ordering::SeqCst), 0);
    assert_eq!(writer_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        *origins.lock(),
        vec![EntryOrigin::Distributed, EntryOrigin::Local]
    );
}

#[tokio::test]
async fn test_cancelled_waiter_does_not_cancel_shared_fetch() {
    let calls = Arc::new(AtomicUsize::new(0));
    let source_cancelled = Arc::new(AtomicBool::new(false));
    let observed = Arc::clone(&source_cancelled);
    let counter = Arc::clone(&calls);
    let source = source_fn(move |key: u32, token: CancellationToken| {
        let calls = Arc::clone(&counter);
        let observed = Arc::clone(&observed);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            observed.store(token.is_cancelled(), Ordering::SeqCst);
            Ok::<_, BoxError>(format!("value-{key}"))
        }
    });
    let engine = Arc::new(
        FunctionCacheEngine::builder(source)
            .with_local_cache(Arc::new(MemoryLocalCache::new()))
            .build()
            .unwrap(),
    );

    let token = CancellationToken::new();
    let impatient = {
        let engine = Arc::clone(&engine);
        let token = token.clone();
        tokio::spawn(async move { engine.get_with_cancellation(5, &token).await })
    };
    let patient = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move { engine.get(5).await })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    token.cancel();

    let err = impatient.await.unwrap().unwrap_err();
    assert!(matches!(err, CacheError::Cancelled { .. }));
    assert_eq!(patient.await.unwrap().unwrap(), "value-5");
    assert!(!source_cancelled.load(Ordering::SeqCst));

    assert_eq!(engine.get(5).await.unwrap(), "value-5");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_early_fetch_serves_cached_value_and_refreshes_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = FunctionCacheEngine::builder(slow_source(Arc::clone(&calls), Duration::ZERO))
        .with_time_to_live(Duration::from_millis(300))
        .with_early_fetch_threshold(Duration::from_millis(200))
        .with_local_cache(Arc::new(MemoryLocalCache::new()))
        .build()
        .unwrap();

    let early_fetches = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&early_fetches);
    engine
        .notifications()
        .on_fetch(SubscriptionOrdering::Append, move |event| {
            if event.early {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
    let writes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&writes);
    engine
        .notifications()
        .on_cache_set(SubscriptionOrdering::Append, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    assert_eq!(engine.get(3).await.unwrap(), "value-3-1");
    tokio::time::sleep(Duration::from_millis(150)).await;

    // Inside the threshold: the cached value comes back immediately
    assert_eq!(engine.get(3).await.unwrap(), "value-3-1");
    assert_eq!(engine.get(3).await.unwrap(), "value-3-1");

    assert!(eventually(|| early_fetches.load(Ordering::SeqCst) == 1).await);
    assert!(eventually(|| writes.load(Ordering::SeqCst) == 2).await);
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let refreshed = engine.get(3).await.unwrap();
    assert_eq!(refreshed, "value-3-2");
    assert_eq!(early_fetches.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_exception_defaults_are_returned_but_never_cached() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let source = source_fn(move |_key: u32, _token| {
        let calls = Arc::clone(&counter);
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<String, BoxError>("upstream unavailable".into())
        }
    });
    let engine = FunctionCacheEngine::builder(source)
        .with_local_cache(Arc::new(MemoryLocalCache::new()))
        .with_continue_on_exception(|key, error| {
            assert!(matches!(error, CacheError::SourceFunction { .. }));
            format!("fallback-{key}")
        })
        .build()
        .unwrap();

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&errors);
    engine
        .notifications()
        .on_error(SubscriptionOrdering::Append, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

    assert_eq!(engine.get(8).await.unwrap(), "fallback-8");
    assert_eq!(engine.get(8).await.unwrap(), "fallback-8");
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(errors.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_source_failure_without_default_reaches_caller() {
    let source = source_fn(|_key: u32, _token| async move {
        Err::<String, BoxError>("upstream unavailable".into())
    });
    let engine = FunctionCacheEngine::builder(source).build().unwrap();

    let err = engine.get(8).await.unwrap_err();
    assert!(matches!(err, CacheError::SourceFunction { .. }));
    assert!(err.to_string().contains("upstream unavailable"));
}

#[tokio::test]
async fn test_missing_key_factory_fills_gaps() {
    let source = multi_source_fn(|keys: Vec<u32>, _token| async move {
        Ok::<_, BoxError>(
            keys.into_iter()
                .filter(|key| key % 2 == 0)
                .map(|key| (key, format!("value-{key}")))
                .collect(),
        )
    });
    let engine = FunctionCacheEngine::builder(source)
        .with_local_cache(Arc::new(MemoryLocalCache::new()))
        .with_missing_key_value_factory(|key| (*key < 5).then(|| "placeholder".to_string()))
        .build()
        .unwrap();

    let values: Vec<(u32, String)> = engine.get_many([1, 2, 7]).await.unwrap();
    assert_eq!(
        values,
        vec![
            (1, "placeholder".to_string()),
            (2, "value-2".to_string()),
        ]
    );

    let err = engine.get(7).await.unwrap_err();
    assert!(matches!(err, CacheError::MissingValue { .. }));
}

#[tokio::test]
async fn test_disabled_caching_always_calls_source() {
    let calls = Arc::new(AtomicUsize::new(0));
    let local: Arc<MemoryLocalCache<u32, String>> = Arc::new(MemoryLocalCache::new());
    let engine = FunctionCacheEngine::builder(slow_source(Arc::clone(&calls), Duration::ZERO))
        .with_local_cache(local.clone())
        .with_caching_disabled()
        .build()
        .unwrap();

    engine.get(1).await.unwrap();
    engine.get(1).await.unwrap();
    engine.get(1).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(local.is_empty());
}

#[tokio::test]
async fn test_disabled_duplicate_catching_fetches_per_caller() {
    let calls = Arc::new(AtomicUsize::new(0));
    let engine = FunctionCacheEngine::builder(slow_source(
        Arc::clone(&calls),
        Duration::from_millis(30),
    ))
    .with_duplicate_request_catching(false)
    .build()
    .unwrap();

    let (first, second) = tokio::join!(engine.get(1), engine.get(1));
    let mut values = vec![first.unwrap(), second.unwrap()];
    values.sort();
    assert_eq!(values, vec!["value-1-1", "value-1-2"]);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_batch_only_fails_its_own_keys() {
    init_for_tests();
    let batches = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&batches);
    let source = multi_source_fn(move |keys: Vec<u32>, _token| {
        let recorded = Arc::clone(&recorded);
        async move {
            recorded.lock().push(keys.clone());
            if keys.contains(&3) {
                return Err::<Vec<(u32, String)>, BoxError>("shard 2 offline".into());
            }
            Ok(keys.into_iter().map(|k| (k, format!("value-{k}"))).collect())
        }
    });
    let engine = FunctionCacheEngine::builder(source)
        .with_local_cache(Arc::new(MemoryLocalCache::new()))
        .with_batching(2, BatchFillPolicy::FillFirstBatchesFully)
        .build()
        .unwrap();

    let result: Result<Vec<(u32, String)>, _> = engine.get_many([1, 2, 3, 4]).await;
    assert!(matches!(result, Err(CacheError::SourceFunction { .. })));

    let mut seen = batches.lock().clone();
    seen.sort();
    assert_eq!(seen, vec![vec![1, 2], vec![3, 4]]);

    let cached: Vec<(u32, String)> = engine.get_many([1, 2]).await.unwrap();
    assert_eq!(cached.len(), 2);
    assert_eq!(batches.lock().len(), 2);
}

#[tokio::test]
async fn test_batches_follow_fill_policy() {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let engine = FunctionCacheEngine::builder(recording_source(Arc::clone(&batches)))
        .with_batching(4, BatchFillPolicy::FillBatchesEvenly)
        .build()
        .unwrap();

    let values: Vec<(u32, String)> = engine.get_many(1..=10).await.unwrap();
    assert_eq!(values.len(), 10);

    let mut sizes: Vec<usize> = batches.lock().iter().map(Vec::len).collect();
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    assert_eq!(sizes, vec![4, 3, 3]);
}

#[tokio::test(start_paused = true)]
async fn test_keep_alive_refreshes_until_stopped() {
    init_for_tests();
    let batches = Arc::new(Mutex::new(Vec::new()));
    let engine = FunctionCacheEngine::builder(recording_source(Arc::clone(&batches)))
        .with_local_cache(Arc::new(MemoryLocalCache::new()))
        .with_keep_alive(Duration::from_millis(100), || vec![1, 2])
        .build()
        .unwrap();

    engine.start_keep_alive().unwrap();
    engine.start_keep_alive().unwrap();
    assert!(engine.is_keep_alive_running());

    tokio::time::sleep(Duration::from_millis(350)).await;
    let cycles = batches.lock().len();
    assert!(cycles >= 3, "expected at least three refreshes, saw {cycles}");
    assert!(batches.lock().iter().all(|batch| batch == &vec![1, 2]));

    assert!(engine.stop_keep_alive());
    assert!(!engine.is_keep_alive_running());
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(batches.lock().len(), cycles);

    // Warmed keys are served without another source call
    let values: Vec<(u32, String)> = engine.get_many([1, 2]).await.unwrap();
    assert_eq!(values.len(), 2);
    assert_eq!(batches.lock().len(), cycles);
}
