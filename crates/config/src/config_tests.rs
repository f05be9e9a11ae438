//! Unit tests for configuration building and loading

use crate::{BatchFillPolicy, ConfigLoader, ConfigSource, EngineConfig, EngineConfigBuilder};
use cachefn_core::CacheError;
use serial_test::serial;
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
    for name in ENV_VARS {
        std::env::remove_var(name);
    }
}

#[test]
fn test_defaults_are_valid() {
    let config = EngineConfig::default();
    assert!(config.duplicate_request_catching);
    assert!(config.caching_enabled);
    assert_eq!(config.batch_fill_policy, BatchFillPolicy::FillBatchesEvenly);
    config.validate().unwrap();
}

#[test]
fn test_builder_validates() {
    let err = EngineConfigBuilder::new()
        .with_jitter_percentage(120.0)
        .build()
        .unwrap_err();
    assert!(matches!(err, CacheError::Configuration { .. }));

    let err = EngineConfigBuilder::new()
        .with_batching(0, BatchFillPolicy::FillFirstBatchesFully)
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("max_batch_size"));

    let err = EngineConfigBuilder::new()
        .with_time_to_live(Duration::from_secs(10))
        .with_early_fetch_threshold(Duration::from_secs(10))
        .build()
        .unwrap_err();
    assert!(err.to_string().contains("early_fetch_threshold"));

    let config = EngineConfigBuilder::new()
        .with_name("users")
        .with_batching(50, BatchFillPolicy::FillFirstBatchesFully)
        .with_jitter_percentage(10.0)
        .build()
        .unwrap();
    assert_eq!(config.name, "users");
    assert_eq!(config.max_batch_size, Some(50));
}

#[test]
fn test_batch_fill_policy_parsing() {
    assert_eq!(
        "evenly".parse::<BatchFillPolicy>().unwrap(),
        BatchFillPolicy::FillBatchesEvenly
    );
    assert_eq!(
        "FILL_FIRST_BATCHES_FULLY".parse::<BatchFillPolicy>().unwrap(),
        BatchFillPolicy::FillFirstBatchesFully
    );
    assert!("sideways".parse::<BatchFillPolicy>().is_err());
}

#[test]
#[serial]
fn test_load_from_file_then_env() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(
        &path,
        r#"{
            "engine": {
                "name": "from-file",
                "time_to_live": 5000,
                "max_batch_size": 20,
                "batch_fill_policy": "fill_first_batches_fully"
            },
            "cached_object": { "refresh_interval": 250 }
        }"#,
    )
    .unwrap();

    std::env::set_var("CACHEFN_TTL_MS", "9000");
    std::env::set_var("CACHEFN_DUPLICATE_REQUEST_CATCHING", "false");

    let loaded = ConfigLoader::new().with_config_file(&path).load().unwrap();
    clear_env();

    let engine = &loaded.settings.engine;
    assert_eq!(engine.name, "from-file");
    assert_eq!(engine.max_batch_size, Some(20));
    assert_eq!(
        engine.batch_fill_policy,
        BatchFillPolicy::FillFirstBatchesFully
    );
    assert_eq!(engine.time_to_live, Duration::from_millis(9000));
    assert!(!engine.duplicate_request_catching);
    assert_eq!(
        loaded.settings.cached_object.refresh_interval,
        Duration::from_millis(250)
    );

    assert_eq!(loaded.sources[0], ConfigSource::Default);
    assert_eq!(loaded.sources[1], ConfigSource::ConfigFile(path));
    assert!(loaded
        .sources
        .contains(&ConfigSource::EnvironmentVariable("CACHEFN_TTL_MS".to_string())));
}

#[test]
#[serial]
fn test_missing_file_uses_defaults() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let loaded = ConfigLoader::new()
        .with_config_file(temp_dir.path().join("absent.json"))
        .load()
        .unwrap();

    assert_eq!(loaded.settings.engine, EngineConfig::default());
    assert_eq!(loaded.sources, vec![ConfigSource::Default]);
}

#[test]
#[serial]
fn test_invalid_env_value_is_rejected() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    std::env::set_var("CACHEFN_MAX_BATCH_SIZE", "lots");

    let result = ConfigLoader::new()
        .with_config_file(temp_dir.path().join("absent.json"))
        .load();
    clear_env();

    assert!(matches!(result, Err(CacheError::Configuration { .. })));
}

#[test]
#[serial]
fn test_malformed_file_is_serialization_error() {
    clear_env();
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("config.json");
    std::fs::write(&path, "{ not json").unwrap();

    let result = ConfigLoader::new().with_config_file(&path).without_env().load();
    assert!(matches!(result, Err(CacheError::Serialization { .. })));
}
