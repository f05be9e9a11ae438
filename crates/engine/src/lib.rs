//! Function caching engine for cachefn
//!
//! This crate wraps an expensive source function with:
//! - Single-flight request coalescing per key
//! - Batched dispatch to multi-key source functions
//! - A local and a distributed cache tier with per-key skip rules
//! - Early refresh of entries close to expiry and keep-alive warming
//! - Self-refreshing cached objects
//!
//! ```no_run
//! use cachefn_engine::{source_fn, FunctionCacheEngine, MemoryLocalCache};
//! use std::sync::Arc;
//!
//! # async fn run() -> cachefn_core::Result<()> {
//! let engine = FunctionCacheEngine::builder(source_fn(|id: u64, _token| async move {
//!     Ok::<_, cachefn_core::BoxError>(format!("user-{id}"))
//! }))
//! .with_local_cache(Arc::new(MemoryLocalCache::new()))
//! .build()?;
//!
//! let name = engine.get(42).await?;
//! assert_eq!(name, "user-42");
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod cached_object;
pub mod codec;
pub mod coordinator;
pub mod engine;
pub mod source;
pub mod tiers;
pub mod ttl;

pub use batch::{plan_batches, BatchScheduler, BatchWindow, KeepAliveHandle};
pub use cached_object::{
    refresh_fn, update_fn, CachedObject, CachedObjectBuilder, CachedObjectState,
    CachedObjectWithUpdates, DisposedEvent, InitializedEvent, RefreshExceptionEvent,
    RefreshOutcome, RefreshSource, UpdateExceptionEvent, UpdateSource, ValueRefreshedEvent,
    ValueUpdatedEvent,
};
pub use codec::{BincodeCodec, JsonCodec, ValueCodec};
pub use coordinator::{Completion, FetchResult, KeyRequestCoordinator, Registration, Waiter};
pub use engine::{CacheableKey, CacheableValue, FunctionCacheEngine, FunctionCacheEngineBuilder};
pub use source::{
    multi_source_fn, source_fn, sync_source_fn, MultiKeySourceFunction, Source, SourceFunction,
};
pub use tiers::{
    DistributedCache, DistributedEntry, DistributedTier, LocalCache, MemoryDistributedCache,
    MemoryLocalCache, SkipRules, TierLookup, TieredCache,
};
pub use ttl::{TimeToLive, TtlPolicy};

// Cancellation tokens appear in every source function signature
pub use tokio_util::sync::CancellationToken;
