//! Engines and cached objects built from loaded configuration

use cachefn_config::{BatchFillPolicy, ConfigLoader, ConfigSource};
use cachefn_core::BoxError;
use cachefn_engine::{multi_source_fn, refresh_fn, CachedObject, FunctionCacheEngine};
use cachefn_utils::tracing::init_for_tests;
use parking_lot::Mutex;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "CACHEFN_DUPLICATE_REQUEST_CATCHING",
    "CACHEFN_CACHING_ENABLED",
    "CACHEFN_TTL_MS",
    "CACHEFN_JITTER_PERCENTAGE",
    "CACHEFN_MAX_BATCH_SIZE",
    "CACHEFN_BATCH_FILL_POLICY",
    "CACHEFN_EARLY_FETCH_THRESHOLD_MS",
    "CACHEFN_KEEP_ALIVE_INTERVAL_MS",
    "CACHEFN_KEY_PREFIX",
];

fn clear_env() {
    init_for_tests();
    for name in ENV_VARS {
        std::env::remove_var(name);
    }
}

fn write_config(dir: &TempDir, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join("config.json");
    std::fs::write(&path, contents).unwrap();
    path
}

const CONFIG: &str = r#"{
    "engine": {
        "name": "inventory",
        "time_to_live": 5000,
        "max_batch_size": 2,
        "batch_fill_policy": "fill_first_batches_fully"
    },
    "cached_object": {
        "name": "feature-flags",
        "refresh_interval": 100
    }
}"#;

async fn batch_sizes_for(config: cachefn_config::EngineConfig, keys: Vec<u32>) -> Vec<usize> {
    let batches = Arc::new(Mutex::new(Vec::new()));
    let recorded = Arc::clone(&batches);
    let source = multi_source_fn(move |keys: Vec<u32>, _token| {
        let recorded = Arc::clone(&recorded);
        async move {
            recorded.lock().push(keys.len());
            Ok::<_, BoxError>(keys.into_iter().map(|k| (k, k * 10)).collect())
        }
    });
    let engine = FunctionCacheEngine::builder(source)
        .with_config(config)
        .build()
        .unwrap();

    let values: Vec<(u32, u32)> = engine.get_many(keys).await.unwrap();
    assert!(values.iter().all(|(key, value)| *value == key * 10));

    let mut sizes = batches.lock().clone();
    sizes.sort_unstable_by(|a, b| b.cmp(a));
    sizes
}

#[tokio::test]
#[serial]
async fn test_engine_uses_batching_from_config_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, CONFIG);

    let loaded = ConfigLoader::new().with_config_file(&path).load().unwrap();
    assert_eq!(loaded.settings.engine.name, "inventory");
    assert_eq!(loaded.settings.engine.time_to_live, Duration::from_secs(5));
    assert_eq!(
        loaded.settings.engine.batch_fill_policy,
        BatchFillPolicy::FillFirstBatchesFully
    );
    assert!(loaded.sources.contains(&ConfigSource::ConfigFile(path)));

    let sizes = batch_sizes_for(loaded.settings.engine, (1..=5).collect()).await;
    assert_eq!(sizes, vec![2, 2, 1]);
}

#[tokio::test]
#[serial]
async fn test_environment_overrides_config_file() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, CONFIG);
    std::env::set_var("CACHEFN_MAX_BATCH_SIZE", "3");
    std::env::set_var("CACHEFN_BATCH_FILL_POLICY", "evenly");

    let loaded = ConfigLoader::new().with_config_file(&path).load();
    clear_env();
    let loaded = loaded.unwrap();

    assert_eq!(loaded.settings.engine.max_batch_size, Some(3));
    assert!(loaded
        .sources
        .contains(&ConfigSource::EnvironmentVariable(
            "CACHEFN_MAX_BATCH_SIZE".to_string()
        )));

    let sizes = batch_sizes_for(loaded.settings.engine, (1..=7).collect()).await;
    assert_eq!(sizes, vec![3, 2, 2]);
}

#[tokio::test]
#[serial]
async fn test_invalid_environment_value_is_rejected() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, CONFIG);
    std::env::set_var("CACHEFN_MAX_BATCH_SIZE", "0");

    let result = ConfigLoader::new().with_config_file(&path).load();
    clear_env();

    let err = result.unwrap_err();
    assert!(err.to_string().contains("max_batch_size"));
}

#[tokio::test]
#[serial]
async fn test_cached_object_refreshes_on_configured_interval() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, CONFIG);
    let loaded = ConfigLoader::new()
        .with_config_file(&path)
        .without_env()
        .load()
        .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let refresh = refresh_fn(move |_current: Option<Arc<usize>>, _token| {
        let calls = Arc::clone(&counter);
        async move { Ok::<_, BoxError>(calls.fetch_add(1, Ordering::SeqCst) + 1) }
    });
    let object = CachedObject::builder(refresh)
        .with_config(loaded.settings.cached_object)
        .build()
        .unwrap();
    assert_eq!(object.name(), "feature-flags");

    object.initialize().await.unwrap();
    assert_eq!(*object.value().unwrap(), 1);

    tokio::time::sleep(Duration::from_millis(350)).await;
    let seen = calls.load(Ordering::SeqCst);
    assert!(seen >= 3, "expected periodic refreshes, saw {seen} calls");
    assert_eq!(*object.value().unwrap(), seen);

    assert!(object.dispose().await);
    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(calls.load(Ordering::SeqCst), seen);
}
