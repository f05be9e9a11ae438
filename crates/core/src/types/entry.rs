//! Cache entries and tier identifiers

use crate::constants::MAX_EXPIRY;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// One of the two cache tiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheTier {
    /// In-process cache
    Local,
    /// Remote cache shared between processes
    Distributed,
}

impl fmt::Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("local"),
            Self::Distributed => f.write_str("distributed"),
        }
    }
}

/// Where a value handed back to the caller came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryOrigin {
    Local,
    Distributed,
    Fetched,
}

impl From<CacheTier> for EntryOrigin {
    fn from(tier: CacheTier) -> Self {
        match tier {
            CacheTier::Local => Self::Local,
            CacheTier::Distributed => Self::Distributed,
        }
    }
}

/// Which tiers a skip predicate applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipTiers {
    Local,
    Distributed,
    All,
}

impl SkipTiers {
    /// Whether this selection covers `tier`
    pub const fn covers(self, tier: CacheTier) -> bool {
        matches!(
            (self, tier),
            (Self::All, _)
                | (Self::Local, CacheTier::Local)
                | (Self::Distributed, CacheTier::Distributed)
        )
    }
}

/// Instant `ttl` from now, clamped to `MAX_EXPIRY`
pub fn expiry_after(ttl: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(ttl.min(MAX_EXPIRY)).unwrap_or(now)
}

/// A value read from one of the tiers together with its expiry
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry<V> {
    pub value: V,
    pub expires_at: Instant,
    pub origin: EntryOrigin,
}

impl<V> CacheEntry<V> {
    pub fn new(value: V, expires_at: Instant, origin: EntryOrigin) -> Self {
        Self {
            value,
            expires_at,
            origin,
        }
    }

    /// Build an entry that expires `ttl` from now
    pub fn expiring_in(value: V, ttl: Duration, origin: EntryOrigin) -> Self {
        Self::new(value, expiry_after(ttl), origin)
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        self.expires_at <= now
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    /// Remaining time to live, zero once expired
    pub fn time_to_live(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn map<U>(self, f: impl FnOnce(V) -> U) -> CacheEntry<U> {
        CacheEntry {
            value: f(self.value),
            expires_at: self.expires_at,
            origin: self.origin,
        }
    }
}
