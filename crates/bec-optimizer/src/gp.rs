//! Gaussian-process surrogate with Expected Improvement acquisition.
//!
//! Observations are kept in unit-cube coordinates. Each suggestion refits the
//! GP (Matérn 5/2 kernel, per-dimension lengthscales, standardized targets)
//! and returns the best of `n_candidates` random unit-cube points under
//! Expected Improvement. Without observations, or when the Cholesky
//! factorization fails, the strategy samples uniformly instead.

use bec_types::{ParameterVector, SearchSpace};
use nalgebra::{DMatrix, DVector};
use rand_chacha::ChaCha8Rng;
use tracing::debug;

use crate::search::{RandomSearch, SearchStrategy};

/// Most recent observations used for a fit. Caps the O(n^3) factorization.
const MAX_TRAIN_POINTS: usize = 100;
const SQRT_5: f64 = 2.236_067_977_499_79;

/// Bayesian search over a fitted Gaussian process.
#[derive(Debug, Clone)]
pub struct GaussianProcessSearch {
    space: SearchSpace,
    n_candidates: usize,
    noise_variance: f64,
    observations: Vec<(Vec<f64>, f64)>,
}

impl GaussianProcessSearch {
    pub const DEFAULT_N_CANDIDATES: usize = 1000;
    pub const DEFAULT_NOISE_VARIANCE: f64 = 1e-6;

    pub fn new(space: SearchSpace) -> Self {
        Self {
            space,
            n_candidates: Self::DEFAULT_N_CANDIDATES,
            noise_variance: Self::DEFAULT_NOISE_VARIANCE,
            observations: Vec::new(),
        }
    }

    pub fn with_candidates(mut self, n: usize) -> Self {
        self.n_candidates = n.max(1);
        self
    }

    pub fn with_noise_variance(mut self, noise_variance: f64) -> Self {
        self.noise_variance = noise_variance;
        self
    }

    /// Number of observations reported so far.
    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }

    fn fit(&self) -> Option<GpModel> {
        let start = self.observations.len().saturating_sub(MAX_TRAIN_POINTS);
        let recent = &self.observations[start..];
        let x: Vec<Vec<f64>> = recent.iter().map(|(x, _)| x.clone()).collect();
        let y: Vec<f64> = recent.iter().map(|(_, y)| *y).collect();
        GpModel::fit(x, &y, self.noise_variance)
    }
}

impl SearchStrategy for GaussianProcessSearch {
    fn suggest(&mut self, rng: &mut ChaCha8Rng) -> ParameterVector {
        let dims = self.space.len();

        let Some(model) = self.fit() else {
            debug!(
                observations = self.observations.len(),
                "no usable surrogate, sampling uniformly"
            );
            return self.space.from_unit(&RandomSearch::sample_unit(dims, rng));
        };

        let mut best_ei = f64::NEG_INFINITY;
        let mut best_x = vec![0.5; dims];
        for _ in 0..self.n_candidates {
            let x = RandomSearch::sample_unit(dims, rng);
            let (mean, std) = model.predict(&x);
            let ei = expected_improvement(mean, std, model.f_best);
            if ei > best_ei {
                best_ei = ei;
                best_x = x;
            }
        }

        debug!(expected_improvement = best_ei, "surrogate proposal");
        self.space.from_unit(&best_x)
    }

    fn report(&mut self, params: &ParameterVector, fitness: f64) {
        if fitness.is_finite() {
            self.observations.push((self.space.to_unit(params), fitness));
        }
    }

    fn name(&self) -> &str {
        "gaussian_process"
    }
}

/// A fitted GP ready for predictions.
struct GpModel {
    cholesky: nalgebra::linalg::Cholesky<f64, nalgebra::Dyn>,
    /// (K + noise * I)^-1 y
    alpha: DVector<f64>,
    x_train: Vec<Vec<f64>>,
    lengthscales: Vec<f64>,
    /// Best observed standardized target.
    f_best: f64,
}

impl GpModel {
    fn fit(x_train: Vec<Vec<f64>>, y_train: &[f64], noise_variance: f64) -> Option<Self> {
        let n = y_train.len();
        if n == 0 {
            return None;
        }

        let y_mean = y_train.iter().sum::<f64>() / n as f64;
        let y_var = if n > 1 {
            y_train.iter().map(|y| (y - y_mean).powi(2)).sum::<f64>() / (n - 1) as f64
        } else {
            1.0
        };
        let y_std = y_var.sqrt().max(1e-10);
        let y: Vec<f64> = y_train.iter().map(|v| (v - y_mean) / y_std).collect();
        let f_best = y.iter().copied().fold(f64::INFINITY, f64::min);

        let dims = x_train[0].len();
        let lengthscales: Vec<f64> = (0..dims)
            .map(|j| {
                let mean = x_train.iter().map(|x| x[j]).sum::<f64>() / n as f64;
                let var = x_train.iter().map(|x| (x[j] - mean).powi(2)).sum::<f64>() / n as f64;
                var.sqrt().max(0.01)
            })
            .collect();

        let k = DMatrix::from_fn(n, n, |i, j| {
            let k = matern52(&x_train[i], &x_train[j], &lengthscales);
            if i == j {
                k + noise_variance
            } else {
                k
            }
        });
        let cholesky = nalgebra::linalg::Cholesky::new(k)?;
        let alpha = cholesky.solve(&DVector::from_column_slice(&y));

        Some(Self {
            cholesky,
            alpha,
            x_train,
            lengthscales,
            f_best,
        })
    }

    /// Posterior mean and standard deviation at `x`.
    fn predict(&self, x: &[f64]) -> (f64, f64) {
        let k_star = DVector::from_fn(self.x_train.len(), |i, _| {
            matern52(x, &self.x_train[i], &self.lengthscales)
        });
        let mean = k_star.dot(&self.alpha);
        let v = self.cholesky.solve(&k_star);
        // Unit signal variance: targets are standardized.
        let var = (1.0 - k_star.dot(&v)).max(0.0);
        (mean, var.sqrt())
    }
}

/// Matérn 5/2 kernel with unit signal variance.
fn matern52(x1: &[f64], x2: &[f64], lengthscales: &[f64]) -> f64 {
    let r_sq: f64 = x1
        .iter()
        .zip(x2)
        .zip(lengthscales)
        .map(|((a, b), l)| ((a - b) / l).powi(2))
        .sum();
    let sqrt5_r = SQRT_5 * r_sq.sqrt();
    (1.0 + sqrt5_r + 5.0 / 3.0 * r_sq) * (-sqrt5_r).exp()
}

fn norm_pdf(x: f64) -> f64 {
    const INV_SQRT_2PI: f64 = 0.398_942_280_401_432_7;
    INV_SQRT_2PI * (-0.5 * x * x).exp()
}

/// Standard normal CDF, Abramowitz-Stegun rational approximation.
fn norm_cdf(x: f64) -> f64 {
    if x < -8.0 {
        return 0.0;
    }
    if x > 8.0 {
        return 1.0;
    }

    let t = 1.0 / (1.0 + 0.231_641_9 * x.abs());
    let inner = 1.781_477_937 + t * (-1.821_255_978 + t * 1.330_274_429);
    let poly = t * (0.319_381_530 + t * (-0.356_563_782 + t * inner));
    let cdf = 1.0 - norm_pdf(x.abs()) * poly;

    if x >= 0.0 {
        cdf
    } else {
        1.0 - cdf
    }
}

/// `EI(x) = (f_best - mean) * Phi(z) + std * phi(z)`, `z = (f_best - mean) / std`.
fn expected_improvement(mean: f64, std: f64, f_best: f64) -> f64 {
    if std < 1e-12 {
        return (f_best - mean).max(0.0);
    }
    let z = (f_best - mean) / std;
    ((f_best - mean) * norm_cdf(z) + std * norm_pdf(z)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bec_types::ParameterValue;
    use rand::SeedableRng;

    #[test]
    fn norm_cdf_matches_known_values() {
        assert!((norm_cdf(0.0) - 0.5).abs() < 1e-7);
        assert!((norm_cdf(1.96) - 0.975).abs() < 1e-4);
        assert!((norm_cdf(-1.96) - 0.025).abs() < 1e-4);
    }

    #[test]
    fn expected_improvement_is_non_negative() {
        assert_eq!(expected_improvement(2.0, 0.0, 1.0), 0.0);
        assert_eq!(expected_improvement(0.5, 0.0, 1.0), 0.5);
        assert!(expected_improvement(3.0, 1.0, 0.0) >= 0.0);
        assert!(expected_improvement(0.0, 1.0, 0.0) > expected_improvement(1.0, 1.0, 0.0));
    }

    #[test]
    fn model_interpolates_training_points() {
        let x = vec![vec![0.1], vec![0.5], vec![0.9]];
        let y = [3.0, 1.0, 2.0];
        let model = GpModel::fit(x, &y, 1e-6).unwrap();

        // Standardized target of the middle point is the minimum.
        let (mean, std) = model.predict(&[0.5]);
        assert!((mean - model.f_best).abs() < 1e-3);
        assert!(std < 1e-2);
    }

    #[test]
    fn falls_back_to_uniform_without_observations() {
        let space = SearchSpace::new().add_float("tof", 0.1, 3.0).add_int("n", 1, 4);
        let mut gp = GaussianProcessSearch::new(space.clone()).with_candidates(50);
        let mut rng = ChaCha8Rng::seed_from_u64(3);

        let params = gp.suggest(&mut rng);
        assert!(space.contains(&params));
        assert_eq!(gp.observation_count(), 0);
    }

    #[test]
    fn suggests_near_the_minimum_of_a_bowl() {
        let space = SearchSpace::new().add_float("x", 0.0, 1.0);
        let mut gp = GaussianProcessSearch::new(space.clone()).with_candidates(2000);

        for i in 0..8 {
            let x = i as f64 / 7.0;
            let params = space.from_unit(&[x]);
            gp.report(&params, (x - 0.3).powi(2));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let proposal = gp.suggest(&mut rng);
        match proposal.get("x") {
            Some(ParameterValue::Float(v)) => assert!((v - 0.3).abs() < 0.2, "proposal {v}"),
            other => panic!("unexpected proposal: {other:?}"),
        }
    }

    #[test]
    fn non_finite_fitness_is_not_observed() {
        let space = SearchSpace::new().add_float("x", 0.0, 1.0);
        let mut gp = GaussianProcessSearch::new(space.clone());
        gp.report(&space.from_unit(&[0.5]), f64::NAN);
        assert_eq!(gp.observation_count(), 0);
    }
}
