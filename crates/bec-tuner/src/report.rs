//! End-of-run summary.

use std::fmt;
use std::path::Path;

use bec_optimizer::{OptimizationResult, SeedMode, TrialRecord};
use bec_types::{ParameterEntry, TuneResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Best parameters in search space order; empty when no trial succeeded.
    pub best_parameters: Vec<ParameterEntry>,
    pub best_fitness: Option<f64>,
    pub evaluations: usize,
    pub iterations: usize,
    pub failed_trials: usize,
    pub seed_mode: SeedMode,
    pub history: Vec<TrialRecord>,
}

impl From<&OptimizationResult> for RunSummary {
    fn from(result: &OptimizationResult) -> Self {
        let best_parameters = result
            .best_parameters()
            .map(|params| {
                params
                    .iter()
                    .map(|(name, value)| ParameterEntry {
                        name: name.to_string(),
                        value,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            run_id: result.run_id,
            best_parameters,
            best_fitness: result.best_fitness(),
            evaluations: result.evaluations,
            iterations: result.iterations,
            failed_trials: result.failed_trials,
            seed_mode: result.seed_mode,
            history: result.history.clone(),
        }
    }
}

impl RunSummary {
    pub fn write_json(&self, path: impl AsRef<Path>) -> TuneResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.best_fitness {
            Some(best) => {
                writeln!(f, "Best parameters found:")?;
                for entry in &self.best_parameters {
                    writeln!(f, "{}: {}", entry.name, entry.value)?;
                }
                writeln!(f, "Best score: {best}")?;
            }
            None => writeln!(f, "No trial produced a usable measurement")?,
        }
        writeln!(f, "Number of evaluations: {}", self.evaluations)?;
        write!(f, "Number of iterations: {}", self.iterations)?;
        if self.failed_trials > 0 {
            write!(f, "\nFailed trials: {}", self.failed_trials)?;
        }
        Ok(())
    }
}
