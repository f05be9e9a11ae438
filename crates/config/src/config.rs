//! Engine and cached object configuration with validation

use crate::serde_helpers::{duration_ms, option_duration_ms};
use cachefn_core::constants::{
    DEFAULT_REFRESH_INTERVAL, DEFAULT_TIME_TO_LIVE, MAX_JITTER_PERCENTAGE,
};
use cachefn_core::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Strategy for distributing pending keys across batches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchFillPolicy {
    /// Split N keys into `ceil(N / max)` batches whose sizes differ by at most one
    #[default]
    FillBatchesEvenly,
    /// Pack batches to the maximum size, leaving the remainder for the last one
    FillFirstBatchesFully,
}

impl FromStr for BatchFillPolicy {
    type Err = CacheError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "fill_batches_evenly" | "evenly" => Ok(Self::FillBatchesEvenly),
            "fill_first_batches_fully" | "fill_first" => Ok(Self::FillFirstBatchesFully),
            other => Err(CacheError::configuration(format!(
                "unknown batch fill policy '{other}'"
            ))),
        }
    }
}

impl fmt::Display for BatchFillPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FillBatchesEvenly => f.write_str("fill_batches_evenly"),
            Self::FillFirstBatchesFully => f.write_str("fill_first_batches_fully"),
        }
    }
}

/// Settings for one function cache engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Name used in tracing spans and event payloads
    pub name: String,
    /// Coalesce concurrent requests for the same key into one fetch
    pub duplicate_request_catching: bool,
    /// When false both tiers are bypassed and every call reaches the source
    pub caching_enabled: bool,
    /// Base time to live for fetched values
    #[serde(with = "duration_ms")]
    pub time_to_live: Duration,
    /// Symmetric jitter applied to every computed TTL, in percent
    pub jitter_percentage: f64,
    /// Upper bound on keys per multi-key source call (None = unbounded)
    pub max_batch_size: Option<usize>,
    pub batch_fill_policy: BatchFillPolicy,
    /// Refresh in the background once the remaining TTL drops below this
    #[serde(with = "option_duration_ms")]
    pub early_fetch_threshold: Option<Duration>,
    /// Interval between keep-alive cycles
    #[serde(with = "option_duration_ms")]
    pub keep_alive_interval: Option<Duration>,
    /// Prefix prepended to every distributed cache key
    pub distributed_key_prefix: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "cachefn".to_string(),
            duplicate_request_catching: true,
            caching_enabled: true,
            time_to_live: DEFAULT_TIME_TO_LIVE,
            jitter_percentage: 0.0,
            max_batch_size: None,
            batch_fill_policy: BatchFillPolicy::FillBatchesEvenly,
            early_fetch_threshold: None,
            keep_alive_interval: None,
            distributed_key_prefix: None,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::new()
    }

    /// Reject values the engine cannot honour
    pub fn validate(&self) -> Result<()> {
        validate_jitter(self.jitter_percentage)?;

        if self.max_batch_size == Some(0) {
            return Err(CacheError::configuration(
                "max_batch_size must be at least 1",
            ));
        }

        if let Some(threshold) = self.early_fetch_threshold {
            if threshold >= self.time_to_live && !self.time_to_live.is_zero() {
                return Err(CacheError::configuration(format!(
                    "early_fetch_threshold ({threshold:?}) must be shorter than time_to_live ({:?})",
                    self.time_to_live
                )));
            }
        }

        if self.keep_alive_interval == Some(Duration::ZERO) {
            return Err(CacheError::configuration(
                "keep_alive_interval must be greater than zero",
            ));
        }

        Ok(())
    }
}

/// Settings for a continuously refreshed cached object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CachedObjectConfig {
    pub name: String,
    #[serde(with = "duration_ms")]
    pub refresh_interval: Duration,
    pub jitter_percentage: f64,
}

impl Default for CachedObjectConfig {
    fn default() -> Self {
        Self {
            name: "cached-object".to_string(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            jitter_percentage: 0.0,
        }
    }
}

impl CachedObjectConfig {
    pub fn validate(&self) -> Result<()> {
        validate_jitter(self.jitter_percentage)?;
        if self.refresh_interval.is_zero() {
            return Err(CacheError::configuration(
                "refresh_interval must be greater than zero",
            ));
        }
        Ok(())
    }
}

fn validate_jitter(jitter_percentage: f64) -> Result<()> {
    if !(0.0..=MAX_JITTER_PERCENTAGE).contains(&jitter_percentage) {
        return Err(CacheError::configuration(format!(
            "jitter_percentage must be between 0 and {MAX_JITTER_PERCENTAGE}, got {jitter_percentage}"
        )));
    }
    Ok(())
}

/// Contents of a config file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineConfig,
    pub cached_object: CachedObjectConfig,
}

/// Source of configuration for debugging and precedence tracking
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default configuration
    Default,
    /// Configuration file
    ConfigFile(PathBuf),
    /// Environment variable
    EnvironmentVariable(String),
}

/// Builder for engine configurations
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration, e.g. one produced by the loader
    pub fn from_config(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn with_duplicate_request_catching(mut self, enabled: bool) -> Self {
        self.config.duplicate_request_catching = enabled;
        self
    }

    pub fn with_caching_enabled(mut self, enabled: bool) -> Self {
        self.config.caching_enabled = enabled;
        self
    }

    pub fn with_time_to_live(mut self, ttl: Duration) -> Self {
        self.config.time_to_live = ttl;
        self
    }

    pub fn with_jitter_percentage(mut self, jitter_percentage: f64) -> Self {
        self.config.jitter_percentage = jitter_percentage;
        self
    }

    pub fn with_batching(mut self, max_batch_size: usize, policy: BatchFillPolicy) -> Self {
        self.config.max_batch_size = Some(max_batch_size);
        self.config.batch_fill_policy = policy;
        self
    }

    pub fn with_early_fetch_threshold(mut self, threshold: Duration) -> Self {
        self.config.early_fetch_threshold = Some(threshold);
        self
    }

    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.config.keep_alive_interval = Some(interval);
        self
    }

    pub fn with_distributed_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.distributed_key_prefix = Some(prefix.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
