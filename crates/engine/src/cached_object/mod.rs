//! Self-refreshing single values
//!
//! A `CachedObject` holds one value produced by a refresh function and
//! re-runs that function on a jittered schedule. Readers always get the
//! latest successfully produced value without waiting on a refresh in
//! progress. `CachedObjectWithUpdates` additionally folds external updates
//! into the value between refreshes.

mod builder;
mod events;
mod object;
mod source;
mod updates;


pub use builder::CachedObjectBuilder;
pub use events::{
    DisposedEvent, InitializedEvent, RefreshExceptionEvent, RefreshOutcome, UpdateExceptionEvent,
    ValueRefreshedEvent, ValueUpdatedEvent,
};
pub use object::CachedObject;
pub use source::{refresh_fn, update_fn, RefreshSource, UpdateSource};
pub use updates::CachedObjectWithUpdates;

use std::fmt;

/// Lifecycle of a cached object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CachedObjectState {
    Uninitialized = 0,
    Initializing = 1,
    Live = 2,
    Disposed = 3,
}

impl CachedObjectState {
    pub(crate) const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Uninitialized,
            1 => Self::Initializing,
            2 => Self::Live,
            _ => Self::Disposed,
        }
    }
}

impl fmt::Display for CachedObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Live => "live",
            Self::Disposed => "disposed",
        };
        f.write_str(name)
    }
}
