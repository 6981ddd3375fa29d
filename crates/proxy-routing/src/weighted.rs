//! Proportional random selection among the members of a tier

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::warn;

/// Source of the random draws used for weighted selection
pub trait RandomSource: Send {
    /// Uniform value in `[0, 1)`
    fn next_unit(&mut self) -> f64;

    /// Uniform index in `[0, n)`; `n` is never zero
    fn next_index(&mut self, n: usize) -> usize;
}

/// Draws from the thread-local generator
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&mut self) -> f64 {
        rand::thread_rng().gen_range(0.0..1.0)
    }

    fn next_index(&mut self, n: usize) -> usize {
        rand::thread_rng().gen_range(0..n)
    }
}

/// Draws from a seeded generator, for reproducible runs
#[derive(Debug, Clone)]
pub struct SeededRandom(StdRng);

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl RandomSource for SeededRandom {
    fn next_unit(&mut self) -> f64 {
        self.0.gen_range(0.0..1.0)
    }

    fn next_index(&mut self, n: usize) -> usize {
        self.0.gen_range(0..n)
    }
}

/// Weighted pick over an ordered list of weights.
///
/// Members with weight zero take no share of the cumulative range. They are
/// only chosen when the draw is exactly `0.0`, or when every member of the tier
/// has weight zero, in which case the tier is treated as equally weighted.
pub struct WeightedSelector;

impl WeightedSelector {
    /// Index of the chosen member, or `None` for an empty list
    pub fn select(weights: &[u32], random: &mut dyn RandomSource) -> Option<usize> {
        if weights.is_empty() {
            return None;
        }

        let mut zero_weight = Vec::new();
        let mut bounds = Vec::with_capacity(weights.len());
        let mut total: u64 = 0;
        for (index, &weight) in weights.iter().enumerate() {
            if weight == 0 {
                zero_weight.push(index);
            } else {
                total += u64::from(weight);
                bounds.push((index, total));
            }
        }

        let draw = random.next_unit();

        if draw == 0.0 && !zero_weight.is_empty() {
            return Some(zero_weight[random.next_index(zero_weight.len())]);
        }

        if total > 0 {
            let scaled = draw * total as f64;
            let chosen = bounds
                .iter()
                .find(|(_, upper)| *upper as f64 >= scaled)
                .or_else(|| bounds.last())
                .map(|(index, _)| *index);
            return chosen;
        }

        warn!(
            "All {} members of the tier have weight 0, selecting with equal weight",
            zero_weight.len()
        );
        Some(zero_weight[random.next_index(zero_weight.len())])
    }
}
