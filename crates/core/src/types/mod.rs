//! Domain types shared by the cache tiers and the engine

mod entry;
mod key;

pub use entry::{expiry_after, CacheEntry, CacheTier, EntryOrigin, SkipTiers};
pub use key::{
    CacheKey, DefaultKeyComparer, DisplayKeySerializer, JsonKeySerializer, KeyComparer,
    KeyContext, KeySerializer,
};
