//! Cache keys with pluggable equality and lazily computed string form
//!
//! A `CacheKey` wraps the caller's original key. Equality and hashing are
//! delegated to a `KeyComparer` so callers can, for example, treat keys
//! case-insensitively without changing the key type. The serialized form is
//! only needed by the distributed tier and is computed once on first use.

use crate::errors::{CacheError, Result, SerializationOp};
use once_cell::sync::OnceCell;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

/// Equality and hashing strategy for keys
pub trait KeyComparer<K>: Send + Sync {
    fn key_hash(&self, key: &K) -> u64;

    fn keys_equal(&self, left: &K, right: &K) -> bool;
}

/// Comparer that defers to the key's own `Hash` and `Eq`
pub struct DefaultKeyComparer<K>(PhantomData<fn(&K)>);

impl<K> DefaultKeyComparer<K> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<K> Default for DefaultKeyComparer<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Hash + Eq> KeyComparer<K> for DefaultKeyComparer<K> {
    fn key_hash(&self, key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn keys_equal(&self, left: &K, right: &K) -> bool {
        left == right
    }
}

/// Converts keys to the string form used by the distributed tier
pub trait KeySerializer<K>: Send + Sync {
    fn serialize_key(&self, key: &K) -> Result<String>;
}

impl<K, F> KeySerializer<K> for F
where
    F: Fn(&K) -> String + Send + Sync,
{
    fn serialize_key(&self, key: &K) -> Result<String> {
        Ok(self(key))
    }
}

/// Serializes keys through their `Display` implementation
pub struct DisplayKeySerializer;

impl<K: fmt::Display> KeySerializer<K> for DisplayKeySerializer {
    fn serialize_key(&self, key: &K) -> Result<String> {
        Ok(key.to_string())
    }
}

/// Serializes keys as compact JSON, useful for tuple and struct keys
pub struct JsonKeySerializer;

impl<K: Serialize> KeySerializer<K> for JsonKeySerializer {
    fn serialize_key(&self, key: &K) -> Result<String> {
        serde_json::to_string(key).map_err(|e| {
            CacheError::serialization("<key>", SerializationOp::SerializeKey, Box::new(e))
        })
    }
}

/// Comparer and serializer shared by every key of one cache
pub struct KeyContext<K> {
    comparer: Arc<dyn KeyComparer<K>>,
    serializer: Option<Arc<dyn KeySerializer<K>>>,
}

impl<K> KeyContext<K> {
    pub fn new(
        comparer: Arc<dyn KeyComparer<K>>,
        serializer: Option<Arc<dyn KeySerializer<K>>>,
    ) -> Self {
        Self {
            comparer,
            serializer,
        }
    }

    pub fn has_serializer(&self) -> bool {
        self.serializer.is_some()
    }

    /// Wrap a raw key so it hashes and compares through this context
    pub fn key(self: &Arc<Self>, key: K) -> CacheKey<K> {
        CacheKey {
            key,
            context: Arc::clone(self),
            serialized: OnceCell::new(),
        }
    }
}

impl<K: Hash + Eq + 'static> Default for KeyContext<K> {
    fn default() -> Self {
        Self::new(Arc::new(DefaultKeyComparer::new()), None)
    }
}

/// Original key plus its lazily computed serialized form
pub struct CacheKey<K> {
    key: K,
    context: Arc<KeyContext<K>>,
    serialized: OnceCell<String>,
}

impl<K> CacheKey<K> {
    pub fn key(&self) -> &K {
        &self.key
    }

    pub fn into_key(self) -> K {
        self.key
    }

    /// Serialized form, computed on first call
    pub fn serialized(&self) -> Result<&str> {
        let serializer = self.context.serializer.as_ref().ok_or_else(|| {
            CacheError::configuration("a key serializer is required for the distributed cache")
        })?;
        self.serialized
            .get_or_try_init(|| serializer.serialize_key(&self.key))
            .map(String::as_str)
    }
}

impl<K: fmt::Debug> CacheKey<K> {
    /// Human readable form for logs and error messages
    pub fn describe(&self) -> String {
        match self.serialized() {
            Ok(serialized) => serialized.to_string(),
            Err(_) => format!("{:?}", self.key),
        }
    }
}

impl<K: Clone> Clone for CacheKey<K> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            context: Arc::clone(&self.context),
            serialized: self.serialized.clone(),
        }
    }
}

impl<K> PartialEq for CacheKey<K> {
    fn eq(&self, other: &Self) -> bool {
        self.context.comparer.keys_equal(&self.key, &other.key)
    }
}

impl<K> Eq for CacheKey<K> {}

impl<K> Hash for CacheKey<K> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.context.comparer.key_hash(&self.key));
    }
}

impl<K: fmt::Debug> fmt::Debug for CacheKey<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheKey")
            .field("key", &self.key)
            .field("serialized", &self.serialized.get())
            .finish()
    }
}
