//! The trial runner: one evaluation of the objective function.
//!
//! dispatch -> wait for the pipeline (bounded) -> extract -> score. Any
//! failure along the way is a trial failure, handled by the
//! [`FailurePolicy`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use bec_optimizer::{Objective, TrialOutcome};
use bec_types::{ConfigError, Measurement, ParameterVector, TrialError, TuneResult};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::completion::CompletionSignal;
use crate::dispatcher::{DispatchRequest, Dispatcher};
use crate::extractor::ResultExtractor;
use crate::scorer::Scorer;

/// What to do when a trial fails.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Record `penalty` as the trial's fitness and keep going. The penalty
    /// should be worse (higher) than any real fitness. The range of real
    /// fitness depends on the scorer and the apparatus, so this is only
    /// checked at run time, where a measured fitness at or above the
    /// penalty is logged as a warning.
    Penalize { penalty: f64 },
    /// Stop the run with the trial error.
    Abort,
}

impl FailurePolicy {
    pub const DEFAULT_PENALTY: f64 = 1e6;
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::Penalize {
            penalty: Self::DEFAULT_PENALTY,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunnerSettings {
    /// Upper bound on dispatch, and separately on waiting for the
    /// measurement pipeline.
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            poll_interval: Duration::from_millis(500),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl RunnerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout.is_zero() {
            return Err(ConfigError::InvalidSetting {
                setting: "timeout".into(),
                message: "must be greater than zero".into(),
            });
        }
        if self.poll_interval.is_zero() {
            return Err(ConfigError::InvalidSetting {
                setting: "poll_interval".into(),
                message: "must be greater than zero".into(),
            });
        }
        if let FailurePolicy::Penalize { penalty } = self.failure_policy {
            if !penalty.is_finite() {
                return Err(ConfigError::InvalidSetting {
                    setting: "failure_policy.penalty".into(),
                    message: format!("must be finite, got {penalty}"),
                });
            }
        }
        Ok(())
    }
}

/// Composes the lab collaborators into the optimizer's [`Objective`].
pub struct TrialRunner {
    dispatcher: Box<dyn Dispatcher>,
    completion: Box<dyn CompletionSignal>,
    extractor: Box<dyn ResultExtractor>,
    scorer: Box<dyn Scorer>,
    artifact: PathBuf,
    settings: RunnerSettings,
    run_id: Uuid,
}

impl TrialRunner {
    pub fn new(
        artifact: impl Into<PathBuf>,
        dispatcher: Box<dyn Dispatcher>,
        completion: Box<dyn CompletionSignal>,
        extractor: Box<dyn ResultExtractor>,
        scorer: Box<dyn Scorer>,
    ) -> Self {
        Self {
            dispatcher,
            completion,
            extractor,
            scorer,
            artifact: artifact.into(),
            settings: RunnerSettings::default(),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_settings(mut self, settings: RunnerSettings) -> Result<Self, ConfigError> {
        settings.validate()?;
        self.settings = settings;
        Ok(self)
    }

    /// Tag dispatched requests with the optimizer's run id.
    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn settings(&self) -> &RunnerSettings {
        &self.settings
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }

    /// Run one trial without applying the failure policy. Returns the
    /// minimized fitness and the measurement it came from.
    pub async fn run_trial(
        &self,
        index: usize,
        params: &ParameterVector,
    ) -> Result<(f64, Measurement), TrialError> {
        self.completion.reset().await?;

        let request = DispatchRequest::new(self.run_id, index, params);
        self.dispatch(&request).await?;
        debug!(trial = index, dispatcher = self.dispatcher.name(), "dispatched");

        self.wait_for_completion().await?;

        let measurement = self.extractor.extract(&self.artifact).await?;
        if !measurement.is_physical() {
            return Err(TrialError::InvalidMeasurement {
                message: format!(
                    "temperature {} K and atom count {} must both be positive",
                    measurement.temperature, measurement.atom_count
                ),
            });
        }
        self.completion.acknowledge().await?;

        let score = self.scorer.score(&measurement);
        let fitness = self.scorer.direction().to_fitness(score);
        if !fitness.is_finite() {
            return Err(TrialError::InvalidMeasurement {
                message: format!("{} scorer produced {fitness}", self.scorer.name()),
            });
        }
        if let FailurePolicy::Penalize { penalty } = self.settings.failure_policy {
            if fitness >= penalty {
                warn!(
                    trial = index,
                    fitness,
                    penalty,
                    "measured fitness is not better than the failure penalty"
                );
            }
        }
        info!(
            trial = index,
            temperature = measurement.temperature,
            atom_count = measurement.atom_count,
            score,
            fitness,
            "trial measured"
        );
        Ok((fitness, measurement))
    }

    /// Dropping the dispatch future on expiry cancels it; a command child is
    /// killed with it.
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), TrialError> {
        match tokio::time::timeout(self.settings.timeout, self.dispatcher.dispatch(request)).await {
            Ok(result) => result,
            Err(_) => Err(TrialError::DispatchFailed {
                message: format!(
                    "{} did not return within {} ms",
                    self.dispatcher.name(),
                    self.settings.timeout.as_millis()
                ),
            }),
        }
    }

    async fn wait_for_completion(&self) -> Result<(), TrialError> {
        match tokio::time::timeout(self.settings.timeout, self.poll_until_complete()).await {
            Ok(result) => result,
            Err(_) => Err(TrialError::MeasurementTimeout {
                timeout_ms: self.settings.timeout.as_millis() as u64,
            }),
        }
    }

    async fn poll_until_complete(&self) -> Result<(), TrialError> {
        loop {
            if self.completion.is_complete().await? {
                return Ok(());
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

#[async_trait]
impl Objective for TrialRunner {
    async fn evaluate(
        &mut self,
        index: usize,
        params: &ParameterVector,
    ) -> TuneResult<TrialOutcome> {
        match self.run_trial(index, params).await {
            Ok((fitness, measurement)) => Ok(TrialOutcome::Scored {
                fitness,
                measurement: Some(measurement),
            }),
            Err(error) => match self.settings.failure_policy {
                FailurePolicy::Penalize { penalty } => {
                    warn!(
                        trial = index,
                        kind = error.kind(),
                        error = %error,
                        penalty,
                        "trial failed, recording penalty"
                    );
                    Ok(TrialOutcome::Penalized {
                        fitness: penalty,
                        error,
                    })
                }
                FailurePolicy::Abort => {
                    warn!(
                        trial = index,
                        kind = error.kind(),
                        error = %error,
                        "trial failed, aborting run"
                    );
                    Err(error.into())
                }
            },
        }
    }
}
