//! Core domain types, errors, and notifications for `cachefn`.
//!
//! This crate establishes the building blocks shared by the caching engine
//! and its configuration layer.
//!
//! ## Key Components
//!
//! - **`errors`**: the `CacheError` enum and `Result` alias. Every variant
//!   carries a `RecoveryHint` and the whole type is `Clone`, so a single
//!   failure can be handed to every caller waiting on the same fetch.
//! - **`types`**: `CacheKey` with its pluggable comparer and lazily computed
//!   serialized form, `CacheEntry`, and the tier/origin enums.
//! - **`events`**: event payloads and the `NotificationHub` that dispatches
//!   them to ordered subscriber lists.
//! - **`constants`**: environment variable names and defaults.

pub mod constants;
pub mod errors;
pub mod events;
pub mod types;

pub use self::{
    constants::*,
    errors::{BoxError, CacheError, RecoveryHint, Result, SerializationOp},
    events::{
        CacheErrorEvent, CacheGetEvent, CacheSetEvent, ErrorEvent, EventChannel, FetchEvent,
        KeyResult, Notification, NotificationHub, Outcome, ResultEvent, SubscriptionId,
        SubscriptionList, SubscriptionOrdering,
    },
    types::*,
};
