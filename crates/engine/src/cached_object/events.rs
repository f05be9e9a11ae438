//! Cached object event payloads

use cachefn_core::CacheError;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Result of the most recent refresh attempt
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshOutcome {
    pub success: bool,
    /// Attempts since the object was created
    pub attempts: u64,
    /// Failures since the last success
    pub consecutive_failures: u32,
    pub duration: Duration,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct InitializedEvent {
    pub name: Arc<str>,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ValueRefreshedEvent<T> {
    pub name: Arc<str>,
    /// `None` for the initial load
    pub previous: Option<Arc<T>>,
    pub current: Arc<T>,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

/// A refresh failed; the previous value is still served
#[derive(Debug, Clone)]
pub struct RefreshExceptionEvent {
    pub name: Arc<str>,
    pub error: CacheError,
    pub consecutive_failures: u32,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ValueUpdatedEvent<T, U> {
    pub name: Arc<str>,
    pub previous: Arc<T>,
    pub current: Arc<T>,
    pub update: Arc<U>,
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct UpdateExceptionEvent<U> {
    pub name: Arc<str>,
    pub update: Arc<U>,
    pub error: CacheError,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct DisposedEvent {
    pub name: Arc<str>,
    pub timestamp: DateTime<Utc>,
}
