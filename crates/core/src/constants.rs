//! Constants used throughout the cachefn workspace

use std::time::Duration;

// Environment variable names
pub const CACHEFN_DUPLICATE_REQUEST_CATCHING_VAR: &str = "CACHEFN_DUPLICATE_REQUEST_CATCHING";
pub const CACHEFN_CACHING_ENABLED_VAR: &str = "CACHEFN_CACHING_ENABLED";
pub const CACHEFN_TTL_MS_VAR: &str = "CACHEFN_TTL_MS";
pub const CACHEFN_JITTER_PERCENTAGE_VAR: &str = "CACHEFN_JITTER_PERCENTAGE";
pub const CACHEFN_MAX_BATCH_SIZE_VAR: &str = "CACHEFN_MAX_BATCH_SIZE";
pub const CACHEFN_BATCH_FILL_POLICY_VAR: &str = "CACHEFN_BATCH_FILL_POLICY";
pub const CACHEFN_EARLY_FETCH_THRESHOLD_MS_VAR: &str = "CACHEFN_EARLY_FETCH_THRESHOLD_MS";
pub const CACHEFN_KEEP_ALIVE_INTERVAL_MS_VAR: &str = "CACHEFN_KEEP_ALIVE_INTERVAL_MS";
pub const CACHEFN_KEY_PREFIX_VAR: &str = "CACHEFN_KEY_PREFIX";

// Config file location under the user config directory
pub const CONFIG_DIR_NAME: &str = "cachefn";
pub const CONFIG_FILE_NAME: &str = "config.json";

// Defaults
pub const DEFAULT_TIME_TO_LIVE: Duration = Duration::from_secs(3600);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 1024;
pub const MAX_JITTER_PERCENTAGE: f64 = 100.0;

/// Furthest an expiry is ever placed in the future; longer TTLs are clamped
pub const MAX_EXPIRY: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);
