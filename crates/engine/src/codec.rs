//! Value codecs for the distributed tier

use cachefn_core::{CacheError, Result, SerializationOp};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Converts values to and from the bytes stored in the distributed tier
pub trait ValueCodec<V>: Send + Sync {
    fn encode(&self, value: &V) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<V>;
}

/// JSON encoding, readable by other processes and languages
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<V: Serialize + DeserializeOwned> ValueCodec<V> for JsonCodec {
    fn encode(&self, value: &V) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| {
            CacheError::serialization("<value>", SerializationOp::SerializeValue, Box::new(e))
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<V> {
        serde_json::from_slice(bytes).map_err(|e| {
            CacheError::serialization("<value>", SerializationOp::DeserializeValue, Box::new(e))
        })
    }
}

/// Compact binary encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl<V: Serialize + DeserializeOwned> ValueCodec<V> for BincodeCodec {
    fn encode(&self, value: &V) -> Result<Vec<u8>> {
        bincode::serialize(value)
            .map_err(|e| CacheError::serialization("<value>", SerializationOp::SerializeValue, e))
    }

    fn decode(&self, bytes: &[u8]) -> Result<V> {
        bincode::deserialize(bytes).map_err(|e| {
            CacheError::serialization("<value>", SerializationOp::DeserializeValue, e)
        })
    }
}
