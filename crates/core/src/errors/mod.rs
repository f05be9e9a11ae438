//! Error types for cachefn operations

mod builders;
mod conversions;
mod display;
mod recovery;
mod types;

pub use types::{BoxError, CacheError, RecoveryHint, Result, SerializationOp, SharedError};
