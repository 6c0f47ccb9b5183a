//! Search strategies that propose the next parameter vector.

use bec_types::{ParameterVector, SearchSpace};
use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// Common trait for all search strategies.
///
/// Strategies draw randomness from the run's RNG only, so a fixed seed makes
/// the proposal sequence reproducible.
pub trait SearchStrategy: Send {
    /// Propose the next parameter vector to evaluate.
    fn suggest(&mut self, rng: &mut ChaCha8Rng) -> ParameterVector;

    /// Report a completed trial so adaptive strategies can learn.
    fn report(&mut self, _params: &ParameterVector, _fitness: f64) {}

    /// Human-readable strategy name.
    fn name(&self) -> &str;
}

/// Independent uniform sampling across the search space.
#[derive(Debug, Clone)]
pub struct RandomSearch {
    space: SearchSpace,
}

impl RandomSearch {
    pub fn new(space: SearchSpace) -> Self {
        Self { space }
    }

    pub(crate) fn sample_unit(dims: usize, rng: &mut ChaCha8Rng) -> Vec<f64> {
        (0..dims).map(|_| rng.gen_range(0.0..=1.0)).collect()
    }
}

impl SearchStrategy for RandomSearch {
    fn suggest(&mut self, rng: &mut ChaCha8Rng) -> ParameterVector {
        let unit = Self::sample_unit(self.space.len(), rng);
        self.space.from_unit(&unit)
    }

    fn name(&self) -> &str {
        "random"
    }
}
