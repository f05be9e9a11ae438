//! Notification system for cache operations
//!
//! Every engine owns a `NotificationHub`. Each event channel keeps an ordered
//! list of synchronous subscriber callbacks, composed with
//! `SubscriptionOrdering::Append` or `SubscriptionOrdering::Overwrite`.
//! A broadcast stream of all notifications is available through
//! `NotificationHub::observe` for consumers that prefer to pull.

pub mod emitter;
pub mod subscriber;
pub mod types;

pub use emitter::NotificationHub;
pub use subscriber::{SubscriptionId, SubscriptionList, SubscriptionOrdering};
pub use types::{
    CacheErrorEvent, CacheGetEvent, CacheSetEvent, ErrorEvent, EventChannel, FetchEvent,
    KeyResult, Notification, Outcome, ResultEvent,
};
