//! Run configuration, loaded from a JSON file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use bec_lab::{
    CommandDispatcher, CompletionSignal, Dispatcher, FailurePolicy, FreshArtifactSignal,
    ImmediateSignal, JsonFileDispatcher, LabeledFieldExtractor, LinearScorer, LogAtomScorer,
    MarkerFileSignal, RunnerSettings, Scorer, TraceDispatcher, TrialRunner,
};
use bec_optimizer::OptimizerConfig;
use bec_types::{ConfigError, SearchSpace, TuneResult};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How parameters reach the sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatcherConfig {
    /// Log the parameters only.
    Trace,
    JsonFile {
        path: PathBuf,
    },
    Command {
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
}

impl DispatcherConfig {
    fn build(&self) -> Result<Box<dyn Dispatcher>, ConfigError> {
        Ok(match self {
            Self::Trace => Box::new(TraceDispatcher),
            Self::JsonFile { path } => Box::new(JsonFileDispatcher::new(path)),
            Self::Command { program, args } => {
                if program.trim().is_empty() {
                    return Err(ConfigError::InvalidSetting {
                        setting: "dispatcher.program".into(),
                        message: "must not be empty".into(),
                    });
                }
                Box::new(CommandDispatcher::new(program, args.clone()))
            }
        })
    }
}

/// How the analysis pipeline announces a finished result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompletionConfig {
    MarkerFile { path: PathBuf },
    /// The artifact itself, once modified after dispatch.
    FreshArtifact,
    Immediate,
}

impl CompletionConfig {
    fn build(&self, artifact: &Path) -> Box<dyn CompletionSignal> {
        match self {
            Self::MarkerFile { path } => Box::new(MarkerFileSignal::new(path)),
            Self::FreshArtifact => Box::new(FreshArtifactSignal::new(artifact)),
            Self::Immediate => Box::new(ImmediateSignal),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScorerConfig {
    Linear {
        #[serde(default = "default_linear_temperature_weight")]
        temperature_weight: f64,
        #[serde(default = "default_atom_divisor")]
        atom_divisor: f64,
    },
    LogAtom {
        #[serde(default = "default_atom_weight")]
        atom_weight: f64,
        #[serde(default = "default_log_temperature_weight")]
        temperature_weight: f64,
    },
}

fn default_linear_temperature_weight() -> f64 {
    LinearScorer::default().temperature_weight
}

fn default_atom_divisor() -> f64 {
    LinearScorer::default().atom_divisor
}

fn default_atom_weight() -> f64 {
    LogAtomScorer::default().atom_weight
}

fn default_log_temperature_weight() -> f64 {
    LogAtomScorer::default().temperature_weight
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self::Linear {
            temperature_weight: default_linear_temperature_weight(),
            atom_divisor: default_atom_divisor(),
        }
    }
}

impl ScorerConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let weights: [(&str, f64); 2] = match self {
            Self::Linear {
                temperature_weight,
                atom_divisor,
            } => {
                if *atom_divisor == 0.0 {
                    return Err(ConfigError::InvalidSetting {
                        setting: "scorer.atom_divisor".into(),
                        message: "must not be zero".into(),
                    });
                }
                [
                    ("scorer.temperature_weight", *temperature_weight),
                    ("scorer.atom_divisor", *atom_divisor),
                ]
            }
            Self::LogAtom {
                atom_weight,
                temperature_weight,
            } => [
                ("scorer.atom_weight", *atom_weight),
                ("scorer.temperature_weight", *temperature_weight),
            ],
        };

        for (setting, value) in weights {
            if !value.is_finite() {
                return Err(ConfigError::InvalidSetting {
                    setting: setting.into(),
                    message: format!("must be finite, got {value}"),
                });
            }
        }
        Ok(())
    }

    fn build(&self) -> Box<dyn Scorer> {
        match self {
            Self::Linear {
                temperature_weight,
                atom_divisor,
            } => Box::new(LinearScorer::new(*temperature_weight, *atom_divisor)),
            Self::LogAtom {
                atom_weight,
                temperature_weight,
            } => Box::new(LogAtomScorer::new(*atom_weight, *temperature_weight)),
        }
    }
}

/// Everything a tuning run needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub optimizer: OptimizerConfig,

    /// Result artifact written by the analysis pipeline.
    #[serde(default = "default_artifact_path")]
    pub artifact_path: PathBuf,

    #[serde(default = "default_dispatcher")]
    pub dispatcher: DispatcherConfig,

    #[serde(default = "default_completion")]
    pub completion: CompletionConfig,

    #[serde(default)]
    pub scorer: ScorerConfig,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_artifact_path() -> PathBuf {
    PathBuf::from("bec_result.txt")
}

fn default_dispatcher() -> DispatcherConfig {
    DispatcherConfig::Trace
}

fn default_completion() -> CompletionConfig {
    CompletionConfig::FreshArtifact
}

fn default_timeout_secs() -> u64 {
    RunnerSettings::default().timeout.as_secs()
}

fn default_poll_interval_ms() -> u64 {
    RunnerSettings::default().poll_interval.as_millis() as u64
}

/// The four knobs of the reference apparatus.
pub fn default_search_space() -> SearchSpace {
    SearchSpace::new()
        .add_float("tof", 0.1, 3.0)
        .add_float("parameter2", 0.0, 1.0)
        .add_float("rf_frequency_mhz", 100.0, 400.0)
        .add_float("evap_ramp_ms", 5.0, 25.0)
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            optimizer: OptimizerConfig::new(default_search_space()).with_budget(50, 10),
            artifact_path: default_artifact_path(),
            dispatcher: default_dispatcher(),
            completion: default_completion(),
            scorer: ScorerConfig::default(),
            timeout_secs: default_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> TuneResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            failure_policy: self.failure_policy,
        }
    }

    /// Check every setting. Nothing is dispatched for an invalid config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.optimizer.validate()?;
        self.runner_settings().validate()?;
        self.scorer.validate()?;
        if self.artifact_path.as_os_str().is_empty() {
            return Err(ConfigError::InvalidSetting {
                setting: "artifact_path".into(),
                message: "must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Assemble the trial runner for the run `run_id`.
    pub fn build_runner(&self, run_id: Uuid) -> Result<TrialRunner, ConfigError> {
        self.validate()?;
        let runner = TrialRunner::new(
            &self.artifact_path,
            self.dispatcher.build()?,
            self.completion.build(&self.artifact_path),
            Box::new(LabeledFieldExtractor::new()),
            self.scorer.build(),
        )
        .with_settings(self.runner_settings())?
        .with_run_id(run_id);
        Ok(runner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bec_optimizer::SeedMode;

    #[test]
    fn default_reproduces_reference_run() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());

        let space = &config.optimizer.search_space;
        let names: Vec<&str> = space.parameters.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["tof", "parameter2", "rf_frequency_mhz", "evap_ramp_ms"]);
        assert_eq!(config.optimizer.n_calls, 50);
        assert_eq!(config.optimizer.n_initial_points, 10);
        assert_eq!(config.optimizer.seed, SeedMode::Entropy);
        assert_eq!(config.timeout_secs, 120);
        assert_eq!(config.poll_interval_ms, 500);
    }

    #[test]
    fn minimal_file_fills_defaults() {
        let json = serde_json::json!({
            "optimizer": {
                "search_space": {
                    "parameters": [
                        {"name": "tof", "kind": {"type": "continuous", "low": 0.1, "high": 3.0}},
                        {"name": "evap_ramp_ms", "kind": {"type": "integer", "low": 5, "high": 25}}
                    ]
                },
                "n_calls": 20,
                "n_initial_points": 5,
                "seed": {"mode": "fixed", "seed": 42}
            },
            "dispatcher": {"kind": "command", "program": "cicero-send"},
            "completion": {"kind": "marker_file", "path": "/tmp/analysis.done"},
            "scorer": {"kind": "log_atom"},
            "failure_policy": {"policy": "abort"}
        });

        let config: RunConfig = serde_json::from_value(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.optimizer.seed, SeedMode::Fixed(42));
        assert_eq!(config.optimizer.n_candidates, 1000);
        assert_eq!(
            config.dispatcher,
            DispatcherConfig::Command {
                program: "cicero-send".into(),
                args: Vec::new()
            }
        );
        assert_eq!(
            config.scorer,
            ScorerConfig::LogAtom {
                atom_weight: 0.5,
                temperature_weight: 5.0
            }
        );
        assert_eq!(config.failure_policy, FailurePolicy::Abort);
        assert_eq!(config.timeout_secs, 120);
    }

    #[test]
    fn load_round_trips_a_saved_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.json");
        let config = RunConfig::default();
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        assert_eq!(RunConfig::load(&path).unwrap(), config);
        assert!(RunConfig::load(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn invalid_bounds_name_the_dimension() {
        let mut config = RunConfig::default();
        config.optimizer.search_space =
            SearchSpace::new().add_float("rf_frequency_mhz", 400.0, 100.0);

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rf_frequency_mhz"), "{err}");
        assert!(config.build_runner(Uuid::new_v4()).is_err());
    }

    #[test]
    fn runner_settings_are_checked() {
        let config = RunConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSetting { setting, .. }) if setting == "poll_interval"
        ));

        let config = RunConfig {
            scorer: ScorerConfig::Linear {
                temperature_weight: 1e8,
                atom_divisor: 0.0,
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RunConfig {
            dispatcher: DispatcherConfig::Command {
                program: " ".into(),
                args: Vec::new(),
            },
            ..Default::default()
        };
        assert!(config.build_runner(Uuid::new_v4()).is_err());
    }

    #[test]
    fn builds_runner_from_defaults() {
        let run_id = Uuid::new_v4();
        let runner = RunConfig::default().build_runner(run_id).unwrap();
        assert_eq!(runner.settings().timeout, Duration::from_secs(120));
        assert_eq!(runner.artifact(), Path::new("bec_result.txt"));
    }
}
