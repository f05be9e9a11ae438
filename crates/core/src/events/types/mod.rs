//! Event payloads emitted by the caching engine

use crate::errors::CacheError;
use crate::types::{CacheTier, EntryOrigin};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Event channels a subscriber can attach to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventChannel {
    Result,
    Fetch,
    Error,
    CacheGet,
    CacheSet,
    CacheError,
}

impl fmt::Display for EventChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Result => "result",
            Self::Fetch => "fetch",
            Self::Error => "error",
            Self::CacheGet => "cache_get",
            Self::CacheSet => "cache_set",
            Self::CacheError => "cache_error",
        };
        f.write_str(name)
    }
}

/// Whether an operation completed successfully
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure,
}

impl Outcome {
    pub const fn from_success(success: bool) -> Self {
        if success {
            Self::Success
        } else {
            Self::Failure
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Success)
    }
}

/// One value delivered to a caller
#[derive(Debug, Clone)]
pub struct KeyResult<K, V> {
    pub key: K,
    pub value: V,
    pub origin: EntryOrigin,
}

/// Emitted once per `get`/`get_many` call when the caller receives its answer
#[derive(Debug, Clone)]
pub struct ResultEvent<K, V> {
    pub cache_name: Arc<str>,
    pub requested: Vec<K>,
    pub results: Vec<KeyResult<K, V>>,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

/// Emitted once per call to the source function
#[derive(Debug, Clone)]
pub struct FetchEvent<K> {
    pub cache_name: Arc<str>,
    pub keys: Vec<K>,
    pub outcome: Outcome,
    /// Set for background refreshes of entries close to expiry
    pub early: bool,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

/// Emitted once per tier read
#[derive(Debug, Clone)]
pub struct CacheGetEvent<K> {
    pub cache_name: Arc<str>,
    pub tier: CacheTier,
    pub hits: Vec<K>,
    pub misses: Vec<K>,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

/// Emitted once per tier write
#[derive(Debug, Clone)]
pub struct CacheSetEvent<K> {
    pub cache_name: Arc<str>,
    pub tier: CacheTier,
    pub keys: Vec<K>,
    pub time_to_live: Duration,
    pub outcome: Outcome,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

/// Emitted when a caller-visible operation fails or a default was substituted
#[derive(Debug, Clone)]
pub struct ErrorEvent<K> {
    pub cache_name: Arc<str>,
    pub keys: Vec<K>,
    pub error: CacheError,
    pub timestamp: DateTime<Utc>,
}

/// Emitted when a tier operation fails, whether or not the failure was tolerated
#[derive(Debug, Clone)]
pub struct CacheErrorEvent<K> {
    pub cache_name: Arc<str>,
    pub tier: CacheTier,
    pub operation: &'static str,
    pub keys: Vec<K>,
    pub error: CacheError,
    pub timestamp: DateTime<Utc>,
}

/// Any notification, as delivered on the broadcast stream
#[derive(Debug, Clone)]
pub enum Notification<K, V> {
    Result(ResultEvent<K, V>),
    Fetch(FetchEvent<K>),
    Error(ErrorEvent<K>),
    CacheGet(CacheGetEvent<K>),
    CacheSet(CacheSetEvent<K>),
    CacheError(CacheErrorEvent<K>),
}

impl<K, V> Notification<K, V> {
    pub const fn channel(&self) -> EventChannel {
        match self {
            Self::Result(_) => EventChannel::Result,
            Self::Fetch(_) => EventChannel::Fetch,
            Self::Error(_) => EventChannel::Error,
            Self::CacheGet(_) => EventChannel::CacheGet,
            Self::CacheSet(_) => EventChannel::CacheSet,
            Self::CacheError(_) => EventChannel::CacheError,
        }
    }
}
