//! Display implementations for cache errors

use super::types::{CacheError, SerializationOp};
use std::fmt;

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SourceFunction { keys, source, .. } => {
                write!(f, "source function failed for {keys}: {source}")
            }
            Self::Backend {
                tier,
                operation,
                source,
                ..
            } => write!(f, "{tier} cache failed during {operation}: {source}"),
            Self::Serialization {
                key,
                operation,
                source,
                ..
            } => write!(f, "failed to {operation} for key '{key}': {source}"),
            Self::Configuration { message, .. } => {
                write!(f, "invalid cache configuration: {message}")
            }
            Self::InvalidKey { key, reason, .. } => {
                write!(f, "invalid cache key '{key}': {reason}")
            }
            Self::MissingValue { key, .. } => {
                write!(f, "source function returned no value for '{key}'")
            }
            Self::RefreshFailed { name, source, .. } => {
                write!(f, "refresh of cached object '{name}' failed: {source}")
            }
            Self::UpdateFailed { name, source, .. } => {
                write!(f, "update of cached object '{name}' failed: {source}")
            }
            Self::Cancelled { key, .. } => {
                write!(f, "request for '{key}' was cancelled")
            }
            Self::FetchAbandoned { key, .. } => {
                write!(f, "pending fetch for '{key}' completed without a result")
            }
            Self::NotInitialized { name, .. } => {
                write!(f, "cached object '{name}' has not been initialized")
            }
            Self::Disposed { name, .. } => {
                write!(f, "cached object '{name}' has been disposed")
            }
        }
    }
}

impl fmt::Display for SerializationOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SerializeKey => f.write_str("serialize key"),
            Self::SerializeValue => f.write_str("serialize value"),
            Self::DeserializeValue => f.write_str("deserialize value"),
        }
    }
}
