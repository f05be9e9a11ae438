//! Recovery utilities for cache errors

use super::types::{CacheError, RecoveryHint};
use crate::types::CacheTier;

impl CacheError {
    /// Get the recovery hint for this error
    #[must_use]
    pub const fn recovery_hint(&self) -> &RecoveryHint {
        match self {
            Self::SourceFunction { recovery_hint, .. }
            | Self::Backend { recovery_hint, .. }
            | Self::Serialization { recovery_hint, .. }
            | Self::Configuration { recovery_hint, .. }
            | Self::InvalidKey { recovery_hint, .. }
            | Self::MissingValue { recovery_hint, .. }
            | Self::RefreshFailed { recovery_hint, .. }
            | Self::UpdateFailed { recovery_hint, .. }
            | Self::Cancelled { recovery_hint, .. }
            | Self::FetchAbandoned { recovery_hint, .. }
            | Self::NotInitialized { recovery_hint, .. }
            | Self::Disposed { recovery_hint, .. } => recovery_hint,
        }
    }

    /// Check if this error is transient and the call can be repeated
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.recovery_hint(),
            RecoveryHint::Retry { .. } | RecoveryHint::CheckBackend { .. }
        )
    }

    /// Errors from the distributed tier never fail a read or write
    #[must_use]
    pub const fn is_tolerated(&self) -> bool {
        matches!(
            self,
            Self::Backend {
                tier: CacheTier::Distributed,
                ..
            }
        )
    }

    /// Check if this error was produced by a key or value codec
    #[must_use]
    pub const fn is_serialization(&self) -> bool {
        matches!(self, Self::Serialization { .. })
    }

    /// Replace the key recorded on a serialization error
    #[must_use]
    pub fn with_key(self, key: impl Into<String>) -> Self {
        match self {
            Self::Serialization {
                operation,
                source,
                recovery_hint,
                ..
            } => Self::Serialization {
                key: key.into(),
                operation,
                source,
                recovery_hint,
            },
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("boom")
        }
    }

    impl std::error::Error for Boom {}

    #[test]
    fn test_distributed_backend_errors_are_tolerated() {
        let err = CacheError::backend(CacheTier::Distributed, "get", Box::new(Boom));
        assert!(err.is_tolerated());
        assert!(err.is_transient());

        let local = CacheError::backend(CacheTier::Local, "get", Box::new(Boom));
        assert!(!local.is_tolerated());
        assert!(!local.is_transient());
    }

    #[test]
    fn test_with_key_only_touches_serialization_errors() {
        let err: CacheError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        let err = err.with_key("user:1");
        assert!(err.is_serialization());
        assert!(err.to_string().contains("user:1"));

        let cancelled = CacheError::cancelled("a").with_key("b");
        assert!(cancelled.to_string().contains("'a'"));
    }

    #[test]
    fn test_cloned_error_keeps_source() {
        let err = CacheError::source_function("[1]", Box::new(Boom));
        let cloned = err.clone();
        assert_eq!(err.to_string(), cloned.to_string());
        assert!(std::error::Error::source(&cloned).is_some());
    }
}
