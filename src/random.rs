//! Randomness source for synthetic sizes, depth jitter and simulated trades

use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};

pub trait RandomSource: Send + Sync {
    /// Uniform sample in `[0, 1)`
    fn next_f64(&self) -> f64;

    /// Uniform sample in `[low, high)`
    fn uniform(&self, low: f64, high: f64) -> f64 {
        low + (high - low) * self.next_f64()
    }

    /// Fair coin flip
    fn coin(&self) -> bool {
        self.next_f64() < 0.5
    }
}

/// Thread-local RNG backed source used in production
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngSource;

impl RandomSource for ThreadRngSource {
    fn next_f64(&self) -> f64 {
        rand::thread_rng().gen::<f64>()
    }
}

/// Always returns the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_f64(&self) -> f64 {
        self.0.clamp(0.0, 0.999_999_999)
    }
}

/// Cycles through a fixed list of values
#[derive(Debug)]
pub struct SequenceRandom {
    values: Vec<f64>,
    next: AtomicUsize,
}

impl SequenceRandom {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            next: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for SequenceRandom {
    fn next_f64(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.values.len();
        self.values[idx].clamp(0.0, 0.999_999_999)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_rng_stays_in_unit_interval() {
        let rng = ThreadRngSource;
        for _ in 0..1_000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn uniform_maps_into_range() {
        let rng = FixedRandom(0.5);
        assert_eq!(rng.uniform(-1.0, 1.0), 0.0);
        assert_eq!(rng.uniform(10.0, 20.0), 15.0);
    }

    #[test]
    fn sequence_cycles() {
        let rng = SequenceRandom::new(vec![0.1, 0.9]);
        assert_eq!(rng.next_f64(), 0.1);
        assert_eq!(rng.next_f64(), 0.9);
        assert_eq!(rng.next_f64(), 0.1);
        assert!(!rng.coin());
        assert!(rng.coin());
    }
}
