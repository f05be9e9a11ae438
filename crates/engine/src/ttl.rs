//! Time-to-live selection for freshly fetched values

use cachefn_utils::apply_jitter;
use std::sync::Arc;
use std::time::Duration;

/// How long a fetched value stays in the cache
pub enum TimeToLive<K, V> {
    Fixed(Duration),
    /// Computed per key and value
    Factory(Arc<dyn Fn(&K, &V) -> Duration + Send + Sync>),
}

impl<K, V> Clone for TimeToLive<K, V> {
    fn clone(&self) -> Self {
        match self {
            Self::Fixed(ttl) => Self::Fixed(*ttl),
            Self::Factory(factory) => Self::Factory(Arc::clone(factory)),
        }
    }
}

/// Base TTL plus random jitter
///
/// A zero TTL means the value is handed to the caller but never stored.
#[derive(Clone)]
pub struct TtlPolicy<K, V> {
    time_to_live: TimeToLive<K, V>,
    jitter_percentage: f64,
}

impl<K, V> TtlPolicy<K, V> {
    pub fn new(time_to_live: TimeToLive<K, V>, jitter_percentage: f64) -> Self {
        Self {
            time_to_live,
            jitter_percentage,
        }
    }

    pub fn fixed(ttl: Duration) -> Self {
        Self::new(TimeToLive::Fixed(ttl), 0.0)
    }

    /// TTL for `value`, with jitter applied
    pub fn compute(&self, key: &K, value: &V) -> Duration {
        let base = match &self.time_to_live {
            TimeToLive::Fixed(ttl) => *ttl,
            TimeToLive::Factory(factory) => factory(key, value),
        };
        if base.is_zero() {
            return base;
        }
        apply_jitter(base, self.jitter_percentage)
    }

    pub fn jitter_percentage(&self) -> f64 {
        self.jitter_percentage
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_factory_sees_key_and_value() {
        let policy: TtlPolicy<u32, String> = TtlPolicy::new(
            TimeToLive::Factory(Arc::new(|key: &u32, value: &String| {
                Duration::from_secs(u64::from(*key) + value.len() as u64)
            })),
            0.0,
        );
        assert_eq!(
            policy.compute(&10, &"abc".to_string()),
            Duration::from_secs(13)
        );
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy: TtlPolicy<u32, u32> =
            TtlPolicy::new(TimeToLive::Fixed(Duration::from_secs(100)), 20.0);
        for _ in 0..200 {
            let ttl = policy.compute(&1, &1);
            assert!(ttl >= Duration::from_secs(80) && ttl <= Duration::from_secs(120));
        }
    }

    #[test]
    fn test_zero_ttl_is_not_jittered() {
        let policy: TtlPolicy<u32, u32> = TtlPolicy::new(TimeToLive::Fixed(Duration::ZERO), 50.0);
        assert_eq!(policy.compute(&1, &1), Duration::ZERO);
    }
}
