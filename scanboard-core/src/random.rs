//! Random source port used by the heuristic classifier and simulated provider

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform samples. Injected so simulations can be replayed.
pub trait RandomSource: Send {
    /// Uniform sample in `[0, 1)`
    fn next_unit(&mut self) -> f64;

    /// Uniform sample in `[lo, hi)`
    fn range_f64(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_unit()
    }

    /// Uniform integer in `[0, upper)`; 0 when `upper` is 0.
    fn below(&mut self, upper: u32) -> u32 {
        if upper == 0 {
            return 0;
        }
        let n = (self.next_unit() * f64::from(upper)) as u32;
        n.min(upper - 1)
    }
}

/// Production source backed by `rand`'s `StdRng`
pub struct StdRandom(StdRng);

impl StdRandom {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    /// Reproducible stream for a given seed
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl RandomSource for StdRandom {
    fn next_unit(&mut self) -> f64 {
        self.0.gen::<f64>()
    }
}

/// Source that always returns the same sample (clamped into `[0, 1)`).
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_unit(&mut self) -> f64 {
        self.0.clamp(0.0, 0.999_999)
    }
}

/// Pick `count` distinct items from `pool` in random order.
pub fn sample_distinct<T: Clone>(rng: &mut dyn RandomSource, pool: &[T], count: usize) -> Vec<T> {
    let mut indices: Vec<usize> = (0..pool.len()).collect();
    let count = count.min(pool.len());
    // Partial Fisher-Yates: the first `count` slots end up shuffled.
    for i in 0..count {
        let remaining = (indices.len() - i) as u32;
        let j = i + rng.below(remaining) as usize;
        indices.swap(i, j);
    }
    indices[..count].iter().map(|&i| pool[i].clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn below_stays_in_range() {
        let mut rng = FixedRandom(0.999_999_9);
        assert_eq!(rng.below(10), 9);
        assert_eq!(rng.below(0), 0);
        let mut rng = FixedRandom(0.0);
        assert_eq!(rng.below(10), 0);
    }

    #[test]
    fn seeded_streams_repeat() {
        let mut a = StdRandom::seeded(42);
        let mut b = StdRandom::seeded(42);
        for _ in 0..16 {
            assert_eq!(a.next_unit(), b.next_unit());
        }
    }

    #[test]
    fn sample_is_distinct_and_bounded() {
        let pool: Vec<u32> = (0..15).collect();
        let mut rng = StdRandom::seeded(7);
        let picked = sample_distinct(&mut rng, &pool, 6);
        assert_eq!(picked.len(), 6);
        let mut dedup = picked.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(dedup.len(), 6);

        let all = sample_distinct(&mut rng, &pool, 100);
        assert_eq!(all.len(), pool.len());
    }
}
