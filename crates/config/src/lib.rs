//! Configuration for cachefn engines and cached objects
//!
//! Values are resolved with the precedence defaults → JSON config file →
//! `CACHEFN_*` environment variables. Programmatic construction goes through
//! `EngineConfigBuilder`.

pub mod config;
pub mod loader;
pub mod serde_helpers;

pub use config::{
    BatchFillPolicy, CachedObjectConfig, ConfigSource, EngineConfig, EngineConfigBuilder,
    Settings,
};
pub use loader::{ConfigLoader, LoadedSettings};

#[cfg(test)]
mod config_tests;
