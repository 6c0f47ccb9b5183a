//! Configuration, reporting and the run entry point of the condensate tuner.
//!
//! Loading a [`RunConfig`] has no side effects. A run starts only when
//! [`run`] is called.

pub mod config;
pub mod report;

pub use config::{default_search_space, CompletionConfig, DispatcherConfig, RunConfig, ScorerConfig};
pub use report::RunSummary;

use bec_optimizer::{OptimizationResult, Optimizer};
use bec_types::TuneResult;
use tracing::info;

/// Validate `config`, then run the whole optimization against the lab.
///
/// Configuration errors are returned before anything is dispatched.
pub async fn run(config: &RunConfig) -> TuneResult<OptimizationResult> {
    config.validate()?;
    let mut optimizer = Optimizer::new(config.optimizer.clone())?;
    let mut runner = config.build_runner(optimizer.run_id())?;

    info!(
        run_id = %optimizer.run_id(),
        artifact = %config.artifact_path.display(),
        dimensions = config.optimizer.search_space.len(),
        timeout_secs = config.timeout_secs,
        "tuning run configured"
    );
    optimizer.run(&mut runner).await
}
