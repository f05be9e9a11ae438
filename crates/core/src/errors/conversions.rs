//! Error conversion utilities

use super::types::{CacheError, RecoveryHint, SerializationOp};
use std::sync::Arc;

/// Convert serde_json errors to cache errors
impl From<serde_json::Error> for CacheError {
    fn from(error: serde_json::Error) -> Self {
        let operation = if error.is_data() || error.is_syntax() || error.is_eof() {
            SerializationOp::DeserializeValue
        } else {
            SerializationOp::SerializeValue
        };
        Self::Serialization {
            key: String::new(),
            operation,
            source: Arc::new(error),
            recovery_hint: RecoveryHint::Manual {
                instructions: "Check JSON format and data types".to_string(),
            },
        }
    }
}

/// Convert bincode errors to cache errors
impl From<bincode::Error> for CacheError {
    fn from(error: bincode::Error) -> Self {
        Self::Serialization {
            key: String::new(),
            operation: SerializationOp::DeserializeValue,
            source: Arc::new(error),
            recovery_hint: RecoveryHint::UpdateConfiguration,
        }
    }
}
