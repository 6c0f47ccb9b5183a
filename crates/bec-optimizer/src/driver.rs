//! Optimization run driver.
//!
//! A run moves through [`SearchPhase::InitialExploration`] (uniform sampling),
//! [`SearchPhase::ModelGuided`] (surrogate proposals) and finally
//! [`SearchPhase::Terminated`] once the evaluation budget is spent. Trials are
//! strictly sequential: each proposal sees every earlier result.

use async_trait::async_trait;
use bec_types::{ConfigError, ParameterVector, SearchSpace, TuneError, TuneResult};
use chrono::Utc;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::gp::GaussianProcessSearch;
use crate::search::{RandomSearch, SearchStrategy};
use crate::trial::{best_of, OptimizationResult, TrialOutcome, TrialRecord};

/// How the run's random number generator is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "seed", rename_all = "snake_case")]
pub enum SeedMode {
    /// Seeded from OS entropy. Production mode.
    Entropy,
    /// Fixed seed for debugging: the full proposal sequence is reproducible.
    Fixed(u64),
}

impl Default for SeedMode {
    fn default() -> Self {
        Self::Entropy
    }
}

impl SeedMode {
    pub fn is_reproducible(&self) -> bool {
        matches!(self, Self::Fixed(_))
    }

    fn rng(&self) -> ChaCha8Rng {
        match self {
            Self::Entropy => ChaCha8Rng::from_entropy(),
            Self::Fixed(seed) => ChaCha8Rng::seed_from_u64(*seed),
        }
    }
}

impl std::fmt::Display for SeedMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Entropy => write!(f, "entropy"),
            Self::Fixed(seed) => write!(f, "fixed({seed})"),
        }
    }
}

/// Configuration for one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub search_space: SearchSpace,

    /// Total number of trials.
    #[serde(default = "default_n_calls")]
    pub n_calls: usize,

    /// Uniformly sampled trials before the surrogate takes over.
    #[serde(default = "default_n_initial_points")]
    pub n_initial_points: usize,

    #[serde(default)]
    pub seed: SeedMode,

    /// Random candidates scored by the acquisition function per proposal.
    #[serde(default = "default_n_candidates")]
    pub n_candidates: usize,

    /// Observation noise added to the kernel diagonal.
    #[serde(default = "default_noise_variance")]
    pub noise_variance: f64,
}

fn default_n_calls() -> usize {
    50
}

fn default_n_initial_points() -> usize {
    10
}

fn default_n_candidates() -> usize {
    GaussianProcessSearch::DEFAULT_N_CANDIDATES
}

fn default_noise_variance() -> f64 {
    GaussianProcessSearch::DEFAULT_NOISE_VARIANCE
}

impl OptimizerConfig {
    pub fn new(search_space: SearchSpace) -> Self {
        Self {
            search_space,
            n_calls: default_n_calls(),
            n_initial_points: default_n_initial_points(),
            seed: SeedMode::Entropy,
            n_candidates: default_n_candidates(),
            noise_variance: default_noise_variance(),
        }
    }

    pub fn with_budget(mut self, n_calls: usize, n_initial_points: usize) -> Self {
        self.n_calls = n_calls;
        self.n_initial_points = n_initial_points;
        self
    }

    pub fn with_seed(mut self, seed: SeedMode) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_candidates(mut self, n_candidates: usize) -> Self {
        self.n_candidates = n_candidates;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.search_space.validate()?;

        if self.n_calls == 0 {
            return Err(ConfigError::ZeroBudget);
        }
        if self.n_initial_points > self.n_calls {
            return Err(ConfigError::InitialPointsExceedBudget {
                initial: self.n_initial_points,
                budget: self.n_calls,
            });
        }
        if self.n_candidates == 0 {
            return Err(ConfigError::InvalidSetting {
                setting: "n_candidates".into(),
                message: "must be at least 1".into(),
            });
        }
        if !self.noise_variance.is_finite() || self.noise_variance <= 0.0 {
            return Err(ConfigError::InvalidSetting {
                setting: "noise_variance".into(),
                message: format!("must be positive, got {}", self.noise_variance),
            });
        }

        Ok(())
    }
}

/// Lifecycle phase of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchPhase {
    InitialExploration,
    ModelGuided,
    Terminated,
}

impl SearchPhase {
    /// Phase of the next proposal after `completed` trials.
    pub fn for_progress(completed: usize, config: &OptimizerConfig) -> Self {
        if completed >= config.n_calls {
            Self::Terminated
        } else if completed >= config.n_initial_points {
            Self::ModelGuided
        } else {
            Self::InitialExploration
        }
    }
}

/// The function being minimized: one call is one trial.
///
/// An `Err` aborts the whole run. Trial failures that should only cost a
/// penalty come back as [`TrialOutcome::Penalized`].
#[async_trait]
pub trait Objective: Send {
    async fn evaluate(
        &mut self,
        index: usize,
        params: &ParameterVector,
    ) -> TuneResult<TrialOutcome>;
}

/// Adapts a plain closure into an [`Objective`].
pub struct FnObjective<F>(pub F);

#[async_trait]
impl<F> Objective for FnObjective<F>
where
    F: FnMut(&ParameterVector) -> f64 + Send,
{
    async fn evaluate(
        &mut self,
        _index: usize,
        params: &ParameterVector,
    ) -> TuneResult<TrialOutcome> {
        Ok(TrialOutcome::Scored {
            fitness: (self.0)(params),
            measurement: None,
        })
    }
}

/// Sequential model-based optimizer.
pub struct Optimizer {
    config: OptimizerConfig,
    run_id: Uuid,
    rng: ChaCha8Rng,
    exploration: RandomSearch,
    model: Box<dyn SearchStrategy>,
    phase: SearchPhase,
    history: Vec<TrialRecord>,
}

impl Optimizer {
    /// Validate the configuration and build an optimizer with the default
    /// Gaussian-process surrogate. Nothing is evaluated here.
    pub fn new(config: OptimizerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let model = GaussianProcessSearch::new(config.search_space.clone())
            .with_candidates(config.n_candidates)
            .with_noise_variance(config.noise_variance);
        Ok(Self::build(config, Box::new(model)))
    }

    /// Same as [`Optimizer::new`] with a custom model-guided strategy.
    pub fn with_strategy(
        config: OptimizerConfig,
        model: Box<dyn SearchStrategy>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config, model))
    }

    fn build(config: OptimizerConfig, model: Box<dyn SearchStrategy>) -> Self {
        Self {
            rng: config.seed.rng(),
            exploration: RandomSearch::new(config.search_space.clone()),
            phase: SearchPhase::for_progress(0, &config),
            run_id: Uuid::new_v4(),
            history: Vec::with_capacity(config.n_calls),
            model,
            config,
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn phase(&self) -> SearchPhase {
        self.phase
    }

    pub fn history(&self) -> &[TrialRecord] {
        &self.history
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Run trials until the budget is spent.
    ///
    /// If the objective aborts, the error is returned and the trials recorded
    /// so far stay in [`Optimizer::history`]; calling `run` again resumes.
    pub async fn run<O>(&mut self, objective: &mut O) -> TuneResult<OptimizationResult>
    where
        O: Objective + ?Sized,
    {
        let started_at = Utc::now();
        info!(
            run_id = %self.run_id,
            n_calls = self.config.n_calls,
            n_initial_points = self.config.n_initial_points,
            strategy = self.model.name(),
            seed = %self.config.seed,
            "optimization run started"
        );
        if let SeedMode::Fixed(seed) = self.config.seed {
            warn!(seed, "fixed seed in use: debug mode, proposals are reproducible");
        }

        while self.phase != SearchPhase::Terminated {
            let index = self.history.len();
            let phase = self.phase;
            let params = match phase {
                SearchPhase::InitialExploration => self.exploration.suggest(&mut self.rng),
                _ => self.model.suggest(&mut self.rng),
            };

            if !self.config.search_space.contains(&params) {
                return Err(TuneError::Internal(format!(
                    "strategy {} proposed a vector outside the search space: {params}",
                    self.model.name()
                )));
            }
            debug!(trial = index, phase = ?phase, params = %params, "proposed parameters");

            let trial_started = Utc::now();
            let outcome = match objective.evaluate(index, &params).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(trial = index, error = %e, "run aborted");
                    return Err(e);
                }
            };

            // Every trial updates the surrogate, penalized ones included.
            self.model.report(&params, outcome.fitness());

            let record = TrialRecord::from_outcome(index, params, phase, outcome, trial_started);
            let (fitness, status) = (record.fitness, record.status);
            self.history.push(record);
            info!(
                trial = index,
                fitness,
                status = ?status,
                best = ?best_of(&self.history).map(|t| t.fitness),
                "trial finished"
            );
            self.phase = SearchPhase::for_progress(self.history.len(), &self.config);
        }

        let result = OptimizationResult::from_history(
            self.run_id,
            self.history.clone(),
            self.history.len(),
            self.config.seed,
            started_at,
        );
        info!(
            run_id = %self.run_id,
            evaluations = result.evaluations,
            failed = result.failed_trials,
            best = ?result.best_fitness(),
            "optimization run finished"
        );
        Ok(result)
    }
}
