//! # bec-optimizer
//!
//! Sequential model-based optimization for the condensate tuner.
//!
//! Provides the search strategies (uniform exploration and a Gaussian-process
//! surrogate with Expected Improvement), trial records, and the [`Optimizer`]
//! driver that walks a run from initial exploration through model-guided
//! search until the evaluation budget is spent.

mod driver;
mod gp;
mod search;
mod trial;

pub use driver::{FnObjective, Objective, Optimizer, OptimizerConfig, SearchPhase, SeedMode};
pub use gp::GaussianProcessSearch;
pub use search::{RandomSearch, SearchStrategy};
pub use trial::{ObjectiveDirection, OptimizationResult, TrialOutcome, TrialRecord, TrialStatus};
