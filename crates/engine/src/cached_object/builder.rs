//! Builder for cached objects

use super::events::RefreshOutcome;
use super::object::{CachedObject, IntervalFactory};
use super::source::{RefreshSource, UpdateSource};
use super::updates::CachedObjectWithUpdates;
use cachefn_config::CachedObjectConfig;
use cachefn_core::Result;
use std::sync::Arc;
use std::time::Duration;

/// Collects the settings of a `CachedObject`
pub struct CachedObjectBuilder<T> {
    config: CachedObjectConfig,
    refresh: Arc<dyn RefreshSource<T>>,
    interval: Option<IntervalFactory>,
}

impl<T: Send + Sync + 'static> CachedObject<T> {
    /// Start building an object refreshed by `refresh`
    pub fn builder(refresh: Arc<dyn RefreshSource<T>>) -> CachedObjectBuilder<T> {
        CachedObjectBuilder::new(refresh)
    }
}

impl<T: Send + Sync + 'static> CachedObjectBuilder<T> {
    pub fn new(refresh: Arc<dyn RefreshSource<T>>) -> Self {
        Self {
            config: CachedObjectConfig::default(),
            refresh,
            interval: None,
        }
    }

    pub fn with_config(mut self, config: CachedObjectConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    /// Refresh on a fixed interval
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.config.refresh_interval = interval;
        self.interval = None;
        self
    }

    /// Choose each delay from the outcome of the previous refresh
    pub fn with_refresh_interval_factory(
        mut self,
        factory: impl Fn(&RefreshOutcome) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.interval = Some(Arc::new(factory));
        self
    }

    pub fn with_jitter_percentage(mut self, jitter_percentage: f64) -> Self {
        self.config.jitter_percentage = jitter_percentage;
        self
    }

    pub fn build(self) -> Result<CachedObject<T>> {
        self.config.validate()?;
        let interval = self.interval.unwrap_or_else(|| {
            let fixed = self.config.refresh_interval;
            Arc::new(move |_: &RefreshOutcome| fixed)
        });
        Ok(CachedObject::new(
            Arc::from(self.config.name.as_str()),
            self.refresh,
            interval,
            self.config.jitter_percentage,
        ))
    }

    /// Build an object that also accepts updates through `updater`
    pub fn build_with_updates<U: Send + Sync + 'static>(
        self,
        updater: Arc<dyn UpdateSource<T, U>>,
    ) -> Result<CachedObjectWithUpdates<T, U>> {
        Ok(CachedObjectWithUpdates::new(self.build()?, updater))
    }
}
