//! Trial records and the result of an optimization run.

use bec_types::{Measurement, ParameterVector, TrialError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::driver::{SearchPhase, SeedMode};

/// How a scorer reads its own output.
///
/// The optimizer always minimizes fitness. A score where higher means a
/// better experiment is negated once, by [`ObjectiveDirection::to_fitness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectiveDirection {
    Maximize,
    Minimize,
}

impl Default for ObjectiveDirection {
    fn default() -> Self {
        Self::Minimize
    }
}

impl ObjectiveDirection {
    /// Convert a raw score into the minimized fitness value.
    pub fn to_fitness(self, score: f64) -> f64 {
        match self {
            Self::Minimize => score,
            Self::Maximize => -score,
        }
    }
}

/// What an objective evaluation produced.
#[derive(Debug, Clone, PartialEq)]
pub enum TrialOutcome {
    /// The trial was measured and scored.
    Scored {
        fitness: f64,
        measurement: Option<Measurement>,
    },
    /// The trial failed and a penalty fitness stands in for the score.
    Penalized { fitness: f64, error: TrialError },
}

impl TrialOutcome {
    pub fn fitness(&self) -> f64 {
        match self {
            Self::Scored { fitness, .. } | Self::Penalized { fitness, .. } => *fitness,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialStatus {
    Completed,
    Penalized,
}

/// One finished trial. Records are only ever created whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    /// Zero-based ordinal within the run.
    pub index: usize,
    pub parameters: ParameterVector,
    pub fitness: f64,
    pub status: TrialStatus,
    /// Phase that proposed the parameters.
    pub phase: SearchPhase,
    pub measurement: Option<Measurement>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl TrialRecord {
    pub(crate) fn from_outcome(
        index: usize,
        parameters: ParameterVector,
        phase: SearchPhase,
        outcome: TrialOutcome,
        started_at: DateTime<Utc>,
    ) -> Self {
        let (fitness, status, measurement, error) = match outcome {
            TrialOutcome::Scored {
                fitness,
                measurement,
            } => (fitness, TrialStatus::Completed, measurement, None),
            TrialOutcome::Penalized { fitness, error } => (
                fitness,
                TrialStatus::Penalized,
                None,
                Some(error.to_string()),
            ),
        };

        Self {
            index,
            parameters,
            fitness,
            status,
            phase,
            measurement,
            error,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == TrialStatus::Completed
    }
}

/// Result of a whole optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub run_id: Uuid,
    /// Lowest-fitness completed trial; `None` when every trial failed.
    pub best: Option<TrialRecord>,
    pub history: Vec<TrialRecord>,
    pub evaluations: usize,
    pub iterations: usize,
    pub failed_trials: usize,
    pub seed_mode: SeedMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OptimizationResult {
    pub(crate) fn from_history(
        run_id: Uuid,
        history: Vec<TrialRecord>,
        iterations: usize,
        seed_mode: SeedMode,
        started_at: DateTime<Utc>,
    ) -> Self {
        let best = best_of(&history).cloned();
        let failed_trials = history.iter().filter(|t| !t.is_completed()).count();

        Self {
            run_id,
            best,
            evaluations: history.len(),
            history,
            iterations,
            failed_trials,
            seed_mode,
            started_at,
            finished_at: Utc::now(),
        }
    }

    pub fn best_parameters(&self) -> Option<&ParameterVector> {
        self.best.as_ref().map(|t| &t.parameters)
    }

    pub fn best_fitness(&self) -> Option<f64> {
        self.best.as_ref().map(|t| t.fitness)
    }
}

/// Lowest finite fitness among completed trials; ties keep the earliest.
pub(crate) fn best_of(history: &[TrialRecord]) -> Option<&TrialRecord> {
    history
        .iter()
        .filter(|t| t.is_completed() && t.fitness.is_finite())
        .fold(None, |best: Option<&TrialRecord>, trial| match best {
            Some(current) if current.fitness <= trial.fitness => Some(current),
            _ => Some(trial),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bec_types::ParameterValue;

    fn record(index: usize, outcome: TrialOutcome) -> TrialRecord {
        let params = ParameterVector::new().with("tof", ParameterValue::Float(index as f64));
        TrialRecord::from_outcome(
            index,
            params,
            SearchPhase::InitialExploration,
            outcome,
            Utc::now(),
        )
    }

    fn scored(fitness: f64) -> TrialOutcome {
        TrialOutcome::Scored {
            fitness,
            measurement: None,
        }
    }

    #[test]
    fn direction_converts_to_minimized_fitness() {
        assert_eq!(ObjectiveDirection::Minimize.to_fitness(-50.0), -50.0);
        assert_eq!(ObjectiveDirection::Maximize.to_fitness(3.0), -3.0);
        assert_eq!(ObjectiveDirection::default(), ObjectiveDirection::Minimize);
    }

    #[test]
    fn penalized_record_keeps_error_message() {
        let trial = record(
            0,
            TrialOutcome::Penalized {
                fitness: 1e6,
                error: TrialError::MeasurementTimeout { timeout_ms: 1000 },
            },
        );

        assert_eq!(trial.status, TrialStatus::Penalized);
        assert!(!trial.is_completed());
        assert!(trial.error.as_deref().unwrap().contains("1000 ms"));
        assert!(trial.finished_at >= trial.started_at);
    }

    #[test]
    fn best_trial_tracking_minimize() {
        let history = vec![
            record(0, scored(0.15)),
            record(1, scored(0.05)),
            record(2, scored(0.05)),
            record(3, scored(0.30)),
        ];

        let best = best_of(&history).unwrap();
        assert_eq!(best.index, 1);
        assert_eq!(best.fitness, 0.05);
    }

    #[test]
    fn non_finite_fitness_never_wins() {
        let history = vec![
            record(0, scored(1.0)),
            record(1, scored(f64::NAN)),
            record(2, scored(f64::NEG_INFINITY)),
            record(3, scored(0.5)),
        ];

        let best = best_of(&history).unwrap();
        assert_eq!(best.index, 3);
        assert!(best_of(&history[1..3]).is_none());
    }

    #[test]
    fn penalized_trials_never_win() {
        let history = vec![
            record(
                0,
                TrialOutcome::Penalized {
                    fitness: -1e9,
                    error: TrialError::DispatchFailed {
                        message: "offline".into(),
                    },
                },
            ),
            record(1, scored(4.0)),
        ];

        let result = OptimizationResult::from_history(
            Uuid::new_v4(),
            history,
            2,
            SeedMode::Entropy,
            Utc::now(),
        );
        assert_eq!(result.best_fitness(), Some(4.0));
        assert_eq!(result.failed_trials, 1);
        assert_eq!(result.evaluations, 2);
    }

    #[test]
    fn all_failed_run_has_no_best() {
        let history = vec![record(
            0,
            TrialOutcome::Penalized {
                fitness: 1e6,
                error: TrialError::MeasurementTimeout { timeout_ms: 5 },
            },
        )];
        let result = OptimizationResult::from_history(
            Uuid::new_v4(),
            history,
            1,
            SeedMode::Fixed(7),
            Utc::now(),
        );
        assert!(result.best.is_none());
        assert!(result.best_parameters().is_none());
    }
}
