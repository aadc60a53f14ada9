//! xorshift64* random number generator
//!
//! Seeded, fast and fully deterministic: the same seed always yields the
//! same sequence, which is what makes pool generation, agent selection
//! and automaton dice rolls replayable. Determinism is a protocol
//! requirement here, not a convenience.

use serde::{Deserialize, Serialize};

/// Deterministic random number generator using xorshift64*.
///
/// # Example
///
/// ```rust
/// use roundtable_consensus_core_rs::rng::RngManager;
///
/// let mut a = RngManager::new(1113);
/// let mut b = RngManager::new(1113);
/// assert_eq!(a.next_u64(), b.next_u64());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RngManager {
    state: u64,
}

impl RngManager {
    /// Create a generator from a seed.
    ///
    /// A zero seed is coerced to 1: xorshift state must be nonzero.
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 1 } else { seed },
        }
    }

    /// Advance the state and return the next 64-bit value.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545F4914F6CDD1D)
    }

    /// Random value in `[min, max)`.
    ///
    /// # Panics
    ///
    /// Panics if `min >= max`.
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        assert!(min < max, "min must be less than max");
        let span = (max - min) as u64;
        min + (self.next_u64() % span) as i64
    }

    /// Random `f64` in `[0.0, 1.0)`.
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / ((1u64 << 53) as f64))
    }

    /// Roll a percentage die: true with probability `percent / 100`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use roundtable_consensus_core_rs::rng::RngManager;
    ///
    /// let mut rng = RngManager::new(7);
    /// assert!(rng.chance(100));
    /// assert!(!rng.chance(0));
    /// ```
    pub fn chance(&mut self, percent: u32) -> bool {
        if percent >= 100 {
            return true;
        }
        if percent == 0 {
            return false;
        }
        (self.next_u64() % 100) < percent as u64
    }

    /// Pick one element of a slice.
    ///
    /// # Panics
    ///
    /// Panics on an empty slice.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        assert!(!items.is_empty(), "cannot pick from an empty slice");
        &items[(self.next_u64() % items.len() as u64) as usize]
    }

    /// Select `n` distinct elements by partial Fisher-Yates shuffle,
    /// preserving selection order determinism.
    ///
    /// # Panics
    ///
    /// Panics if `n` exceeds the item count.
    pub fn sample<T: Clone>(&mut self, items: &[T], n: usize) -> Vec<T> {
        assert!(n <= items.len(), "sample size exceeds population");
        let mut pool: Vec<T> = items.to_vec();
        let mut selected = Vec::with_capacity(n);
        for _ in 0..n {
            let idx = (self.next_u64() % pool.len() as u64) as usize;
            selected.push(pool.swap_remove(idx));
        }
        selected
    }

    /// Current internal state, for checkpointing.
    pub fn state(&self) -> u64 {
        self.state
    }
}
