//! Core error type definitions

use crate::types::CacheTier;
use std::sync::Arc;
use std::time::Duration;

/// Result type alias for cachefn operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Boxed error produced by source functions and cache backends
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shareable form of an underlying error, so `CacheError` can be cloned
/// and handed to every waiter of a coalesced fetch.
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// Error type for cache operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The wrapped source function failed
    SourceFunction {
        keys: String,
        source: SharedError,
        recovery_hint: RecoveryHint,
    },

    /// A cache tier failed to complete an operation
    Backend {
        tier: CacheTier,
        operation: &'static str,
        source: SharedError,
        recovery_hint: RecoveryHint,
    },

    /// Key or value could not be serialized or deserialized
    Serialization {
        key: String,
        operation: SerializationOp,
        source: SharedError,
        recovery_hint: RecoveryHint,
    },

    /// Invalid configuration
    Configuration {
        message: String,
        recovery_hint: RecoveryHint,
    },

    /// The key could not be used by the cache
    InvalidKey {
        key: String,
        reason: String,
        recovery_hint: RecoveryHint,
    },

    /// The source function returned no value for a requested key
    MissingValue {
        key: String,
        recovery_hint: RecoveryHint,
    },

    /// Refreshing a cached object failed
    RefreshFailed {
        name: String,
        source: SharedError,
        recovery_hint: RecoveryHint,
    },

    /// Applying an update to a cached object failed
    UpdateFailed {
        name: String,
        source: SharedError,
        recovery_hint: RecoveryHint,
    },

    /// The caller's cancellation token fired while waiting
    Cancelled {
        key: String,
        recovery_hint: RecoveryHint,
    },

    /// The task completing a pending fetch went away without a result
    FetchAbandoned {
        key: String,
        recovery_hint: RecoveryHint,
    },

    /// A cached object was read before its first successful refresh
    NotInitialized {
        name: String,
        recovery_hint: RecoveryHint,
    },

    /// A cached object was used after disposal
    Disposed {
        name: String,
        recovery_hint: RecoveryHint,
    },
}

/// Recovery hints for error handling
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryHint {
    /// Retry the operation
    Retry { after: Duration },

    /// Verify connectivity of a remote cache
    CheckBackend { tier: CacheTier },

    /// Fix the configuration that produced the error
    UpdateConfiguration,

    /// Initialize the object before reading it
    Initialize,

    /// Operation can be safely ignored
    Ignore,

    /// No automated recovery possible
    Manual { instructions: String },

    /// No recovery possible
    NoRecovery,
}

/// Serialization operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializationOp {
    SerializeKey,
    SerializeValue,
    DeserializeValue,
}
