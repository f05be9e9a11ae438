//! Symmetric multiplicative jitter for TTLs and refresh intervals
//!
//! A jitter of `p` percent scales the base duration by a factor drawn
//! uniformly from `[1 - p/100, 1 + p/100]`.

use rand::Rng;
use std::time::Duration;

/// Apply jitter using the thread-local RNG
pub fn apply_jitter(base: Duration, jitter_percentage: f64) -> Duration {
    apply_jitter_with(base, jitter_percentage, &mut rand::thread_rng())
}

/// Apply jitter using the provided RNG
pub fn apply_jitter_with<R: Rng + ?Sized>(
    base: Duration,
    jitter_percentage: f64,
    rng: &mut R,
) -> Duration {
    if jitter_percentage <= 0.0 || base.is_zero() {
        return base;
    }

    let spread = jitter_percentage.min(100.0) / 100.0;
    let factor = 1.0 + rng.gen_range(-spread..=spread);
    Duration::try_from_secs_f64(base.as_secs_f64() * factor.max(0.0)).unwrap_or(Duration::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_zero_jitter_is_identity() {
        let base = Duration::from_millis(1000);
        assert_eq!(apply_jitter(base, 0.0), base);
        assert_eq!(apply_jitter(Duration::ZERO, 50.0), Duration::ZERO);
    }

    #[test]
    fn test_twenty_percent_jitter_is_bounded_and_spread() {
        let mut rng = StdRng::seed_from_u64(42);
        let base = Duration::from_millis(1000);
        let mut buckets = [0usize; 4];

        for _ in 0..1000 {
            let sample = apply_jitter_with(base, 20.0, &mut rng);
            assert!(sample >= Duration::from_millis(800), "{sample:?} below range");
            assert!(sample <= Duration::from_millis(1200), "{sample:?} above range");

            let offset = sample.as_secs_f64() * 1000.0 - 800.0;
            let bucket = ((offset / 100.0) as usize).min(3);
            buckets[bucket] += 1;
        }

        // 250 expected per bucket under a uniform distribution
        for count in buckets {
            assert!((175..=325).contains(&count), "uneven buckets: {buckets:?}");
        }
    }

    #[test]
    fn test_jitter_saturates_on_huge_durations() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let sample = apply_jitter_with(Duration::MAX, 50.0, &mut rng);
            assert!(sample >= Duration::MAX / 2);
        }
    }

    proptest! {
        #[test]
        fn prop_jitter_stays_within_bounds(base_ms in 1u64..100_000, pct in 0.0f64..=100.0) {
            let base = Duration::from_millis(base_ms);
            let sample = apply_jitter(base, pct);
            let low = base.as_secs_f64() * (1.0 - pct / 100.0);
            let high = base.as_secs_f64() * (1.0 + pct / 100.0);
            prop_assert!(sample.as_secs_f64() >= low - 1e-6);
            prop_assert!(sample.as_secs_f64() <= high + 1e-6);
        }
    }
}
