//! Constructor helpers for common cache errors

use super::types::{BoxError, CacheError, RecoveryHint, SerializationOp};
use crate::types::CacheTier;
use std::sync::Arc;

impl CacheError {
    /// Wrap a source function failure for the given keys
    pub fn source_function(keys: impl Into<String>, source: BoxError) -> Self {
        Self::SourceFunction {
            keys: keys.into(),
            source: Arc::from(source),
            recovery_hint: RecoveryHint::NoRecovery,
        }
    }

    /// Wrap a failure raised by one of the cache tiers
    pub fn backend(tier: CacheTier, operation: &'static str, source: BoxError) -> Self {
        let recovery_hint = match tier {
            CacheTier::Local => RecoveryHint::NoRecovery,
            CacheTier::Distributed => RecoveryHint::CheckBackend { tier },
        };
        Self::Backend {
            tier,
            operation,
            source: Arc::from(source),
            recovery_hint,
        }
    }

    /// Wrap a key/value codec failure
    pub fn serialization(
        key: impl Into<String>,
        operation: SerializationOp,
        source: BoxError,
    ) -> Self {
        Self::Serialization {
            key: key.into(),
            operation,
            source: Arc::from(source),
            recovery_hint: RecoveryHint::UpdateConfiguration,
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            recovery_hint: RecoveryHint::UpdateConfiguration,
        }
    }

    /// Create an invalid key error
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
            recovery_hint: RecoveryHint::Manual {
                instructions: "Check the key serializer and key comparer".to_string(),
            },
        }
    }

    /// The source omitted `key` and no missing-key factory was configured
    pub fn missing_value(key: impl Into<String>) -> Self {
        Self::MissingValue {
            key: key.into(),
            recovery_hint: RecoveryHint::Manual {
                instructions: "Configure a missing key value factory or return every key"
                    .to_string(),
            },
        }
    }

    /// Wrap a failed refresh or update of a cached object
    pub fn refresh_failed(name: impl Into<String>, source: BoxError) -> Self {
        Self::RefreshFailed {
            name: name.into(),
            source: Arc::from(source),
            recovery_hint: RecoveryHint::Retry {
                after: std::time::Duration::ZERO,
            },
        }
    }

    /// An update function rejected the change; the previous value is kept
    pub fn update_failed(name: impl Into<String>, source: BoxError) -> Self {
        Self::UpdateFailed {
            name: name.into(),
            source: Arc::from(source),
            recovery_hint: RecoveryHint::NoRecovery,
        }
    }

    /// The caller stopped waiting for `key`
    pub fn cancelled(key: impl Into<String>) -> Self {
        Self::Cancelled {
            key: key.into(),
            recovery_hint: RecoveryHint::Ignore,
        }
    }

    /// The pending fetch for `key` was dropped without completing
    pub fn fetch_abandoned(key: impl Into<String>) -> Self {
        Self::FetchAbandoned {
            key: key.into(),
            recovery_hint: RecoveryHint::Retry {
                after: std::time::Duration::ZERO,
            },
        }
    }

    /// Read of a cached object before its first successful refresh
    pub fn not_initialized(name: impl Into<String>) -> Self {
        Self::NotInitialized {
            name: name.into(),
            recovery_hint: RecoveryHint::Initialize,
        }
    }

    /// Use of a cached object after disposal
    pub fn disposed(name: impl Into<String>) -> Self {
        Self::Disposed {
            name: name.into(),
            recovery_hint: RecoveryHint::NoRecovery,
        }
    }
}
