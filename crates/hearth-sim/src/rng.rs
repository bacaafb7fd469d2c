//! Per-villager deterministic randomness.
//!
//! Each villager carries a `u32` PRNG state. Every draw reseeds a
//! [`Pcg32`] from that state, samples, and writes back the generator's next
//! output as the new state. The same seed therefore always yields the same
//! sequence regardless of how many other villagers exist.

use rand::{Rng, RngCore, SeedableRng};
use rand_pcg::Pcg32;

fn generator(state: u32) -> Pcg32 {
    Pcg32::seed_from_u64(state as u64)
}

/// Advance the state by one step without sampling.
pub fn advance(state: u32) -> u32 {
    generator(state).next_u32()
}

/// Uniform sample in `[lo, hi]`, returning the advanced state alongside.
/// Bounds given in the wrong order are swapped.
pub fn uniform(state: u32, lo: f32, hi: f32) -> (u32, f32) {
    let (lo, hi) = if hi < lo { (hi, lo) } else { (lo, hi) };
    let mut rng = generator(state);
    let value = if hi > lo { rng.gen_range(lo..=hi) } else { lo };
    (rng.next_u32(), value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_state_same_sample() {
        assert_eq!(uniform(42, 0.5, 1.5), uniform(42, 0.5, 1.5));
        assert_ne!(advance(42), 42);
    }

    #[test]
    fn samples_stay_in_range() {
        let mut state = 7;
        for _ in 0..200 {
            let (next, value) = uniform(state, 0.5, 1.5);
            assert!((0.5..=1.5).contains(&value));
            state = next;
        }
    }

    #[test]
    fn degenerate_and_reversed_bounds() {
        assert_eq!(uniform(1, 2.0, 2.0).1, 2.0);
        let (_, v) = uniform(1, 3.0, 1.0);
        assert!((1.0..=3.0).contains(&v));
    }
}
