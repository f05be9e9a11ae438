//! Configuration loader with precedence handling
//!
//! Defaults are overridden by the JSON config file (if present), which is in
//! turn overridden by `CACHEFN_*` environment variables.

use crate::config::{BatchFillPolicy, ConfigSource, Settings};
use cachefn_core::constants::{
    CACHEFN_BATCH_FILL_POLICY_VAR, CACHEFN_CACHING_ENABLED_VAR,
    CACHEFN_DUPLICATE_REQUEST_CATCHING_VAR, CACHEFN_EARLY_FETCH_THRESHOLD_MS_VAR,
    CACHEFN_JITTER_PERCENTAGE_VAR, CACHEFN_KEEP_ALIVE_INTERVAL_MS_VAR, CACHEFN_KEY_PREFIX_VAR,
    CACHEFN_MAX_BATCH_SIZE_VAR, CACHEFN_TTL_MS_VAR,
};
use cachefn_core::{CacheError, RecoveryHint, Result, SerializationOp};
use cachefn_utils::XdgPaths;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Settings together with the sources that contributed to them
#[derive(Debug, Clone)]
pub struct LoadedSettings {
    pub settings: Settings,
    pub sources: Vec<ConfigSource>,
}

/// Configuration loader that handles precedence
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    read_env: bool,
}

impl ConfigLoader {
    /// Loader using the default config file location and the environment
    pub fn new() -> Self {
        Self {
            config_file: None,
            read_env: true,
        }
    }

    /// Read a specific config file instead of the XDG default
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Skip environment variable overrides
    pub fn without_env(mut self) -> Self {
        self.read_env = false;
        self
    }

    /// Load configuration with full precedence handling
    pub fn load(&self) -> Result<LoadedSettings> {
        let mut loaded = LoadedSettings {
            settings: Settings::default(),
            sources: vec![ConfigSource::Default],
        };

        let path = self
            .config_file
            .clone()
            .unwrap_or_else(XdgPaths::config_file);
        if let Some(settings) = Self::load_from_path(&path)? {
            loaded.settings = settings;
            loaded.sources.push(ConfigSource::ConfigFile(path));
        }

        if self.read_env {
            let applied = Self::apply_env(&mut loaded.settings)?;
            loaded
                .sources
                .extend(applied.into_iter().map(ConfigSource::EnvironmentVariable));
        }

        loaded.settings.engine.validate()?;
        loaded.settings.cached_object.validate()?;

        debug!(sources = ?loaded.sources, "Loaded cache configuration");
        Ok(loaded)
    }

    /// Load a config file, returning `None` if it does not exist
    pub fn load_from_path(path: &Path) -> Result<Option<Settings>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(path).map_err(|e| CacheError::Configuration {
            message: format!("failed to read config file '{}': {e}", path.display()),
            recovery_hint: RecoveryHint::Manual {
                instructions: format!("Check permissions on {}", path.display()),
            },
        })?;

        let settings = serde_json::from_str(&content).map_err(|e| CacheError::Serialization {
            key: path.display().to_string(),
            operation: SerializationOp::DeserializeValue,
            source: Arc::new(e),
            recovery_hint: RecoveryHint::Manual {
                instructions: "Check config file syntax".to_string(),
            },
        })?;

        Ok(Some(settings))
    }

    /// Apply `CACHEFN_*` overrides, returning the names of the variables used
    fn apply_env(settings: &mut Settings) -> Result<Vec<String>> {
        let mut applied = Vec::new();
        let engine = &mut settings.engine;

        if let Some(value) = read_var(CACHEFN_DUPLICATE_REQUEST_CATCHING_VAR, &mut applied) {
            engine.duplicate_request_catching =
                parse_bool(CACHEFN_DUPLICATE_REQUEST_CATCHING_VAR, &value)?;
        }

        if let Some(value) = read_var(CACHEFN_CACHING_ENABLED_VAR, &mut applied) {
            engine.caching_enabled = parse_bool(CACHEFN_CACHING_ENABLED_VAR, &value)?;
        }

        if let Some(value) = read_var(CACHEFN_TTL_MS_VAR, &mut applied) {
            engine.time_to_live = parse_millis(CACHEFN_TTL_MS_VAR, &value)?;
        }

        if let Some(value) = read_var(CACHEFN_JITTER_PERCENTAGE_VAR, &mut applied) {
            engine.jitter_percentage = value.trim().parse::<f64>().map_err(|_| {
                CacheError::configuration(format!(
                    "{CACHEFN_JITTER_PERCENTAGE_VAR} must be a number, got '{value}'"
                ))
            })?;
        }

        if let Some(value) = read_var(CACHEFN_MAX_BATCH_SIZE_VAR, &mut applied) {
            let size = value.trim().parse::<usize>().map_err(|_| {
                CacheError::configuration(format!(
                    "{CACHEFN_MAX_BATCH_SIZE_VAR} must be a positive integer, got '{value}'"
                ))
            })?;
            engine.max_batch_size = Some(size);
        }

        if let Some(value) = read_var(CACHEFN_BATCH_FILL_POLICY_VAR, &mut applied) {
            engine.batch_fill_policy = value.parse::<BatchFillPolicy>()?;
        }

        if let Some(value) = read_var(CACHEFN_EARLY_FETCH_THRESHOLD_MS_VAR, &mut applied) {
            engine.early_fetch_threshold =
                Some(parse_millis(CACHEFN_EARLY_FETCH_THRESHOLD_MS_VAR, &value)?);
        }

        if let Some(value) = read_var(CACHEFN_KEEP_ALIVE_INTERVAL_MS_VAR, &mut applied) {
            engine.keep_alive_interval =
                Some(parse_millis(CACHEFN_KEEP_ALIVE_INTERVAL_MS_VAR, &value)?);
        }

        if let Some(value) = read_var(CACHEFN_KEY_PREFIX_VAR, &mut applied) {
            engine.distributed_key_prefix = Some(value);
        }

        Ok(applied)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn read_var(name: &str, applied: &mut Vec<String>) -> Option<String> {
    let value = std::env::var(name).ok()?;
    applied.push(name.to_string());
    Some(value)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(CacheError::configuration(format!(
            "{name} must be a boolean, got '{other}'"
        ))),
    }
}

fn parse_millis(name: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| {
            CacheError::configuration(format!(
                "{name} must be a whole number of milliseconds, got '{value}'"
            ))
        })
}
