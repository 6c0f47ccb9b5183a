use std::path::PathBuf;

use thiserror::Error;

use crate::measurement::MeasurementField;

/// Main error type for the tuner
#[derive(Error, Debug)]
pub enum TuneError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Trial error: {0}")]
    Trial(#[from] TrialError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration errors. All of them are fatal at startup, before any trial runs.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Search space has no dimensions")]
    EmptySearchSpace,

    #[error("Dimension #{index} has an empty name")]
    UnnamedDimension { index: usize },

    #[error("Duplicate dimension name: {name}")]
    DuplicateDimension { name: String },

    #[error("Invalid bounds for dimension {dimension}: low {low} must be below high {high}")]
    InvalidBounds {
        dimension: String,
        low: f64,
        high: f64,
    },

    #[error("Evaluation budget must be at least 1")]
    ZeroBudget,

    #[error("Initial exploration points ({initial}) exceed the evaluation budget ({budget})")]
    InitialPointsExceedBudget { initial: usize, budget: usize },

    #[error("Invalid setting {setting}: {message}")]
    InvalidSetting { setting: String, message: String },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

/// Trial-level failures. Each one aborts the current trial only; the trial
/// runner's failure policy decides between a penalty and aborting the run.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrialError {
    #[error("Field {field} not found in result artifact")]
    FieldNotFound { field: MeasurementField },

    #[error("Malformed value for field {field}: {token:?} is not a number")]
    MalformedValue {
        field: MeasurementField,
        token: String,
    },

    #[error("Result artifact {} unreadable: {message}", path.display())]
    ArtifactUnreadable { path: PathBuf, message: String },

    #[error("Dispatch failed: {message}")]
    DispatchFailed { message: String },

    #[error("Measurement not available after {timeout_ms} ms")]
    MeasurementTimeout { timeout_ms: u64 },

    #[error("Measurement rejected: {message}")]
    InvalidMeasurement { message: String },
}

impl TrialError {
    /// Short stable tag for logs and summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::FieldNotFound { .. } => "field_not_found",
            Self::MalformedValue { .. } => "malformed_value",
            Self::ArtifactUnreadable { .. } => "artifact_unreadable",
            Self::DispatchFailed { .. } => "dispatch_failed",
            Self::MeasurementTimeout { .. } => "measurement_timeout",
            Self::InvalidMeasurement { .. } => "invalid_measurement",
        }
    }

    /// Whether the command never reached the apparatus.
    pub fn is_dispatch_failure(&self) -> bool {
        matches!(self, Self::DispatchFailed { .. })
    }
}

/// Result type alias for tuner operations
pub type TuneResult<T> = Result<T, TuneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_names_dimension() {
        let error = ConfigError::InvalidBounds {
            dimension: "tof".to_string(),
            low: 3.0,
            high: 0.1,
        };

        let message = error.to_string();
        assert!(message.contains("tof"));
        assert!(message.contains('3'));
    }

    #[test]
    fn test_error_display_names_field() {
        let error = TrialError::FieldNotFound {
            field: MeasurementField::Temperature,
        };
        assert!(error.to_string().contains("temperature"));

        let error = TrialError::MalformedValue {
            field: MeasurementField::AtomCount,
            token: "abc".to_string(),
        };
        assert!(error.to_string().contains("atom count"));
        assert!(error.to_string().contains("abc"));
    }

    #[test]
    fn test_error_conversion() {
        let trial_error = TrialError::MeasurementTimeout { timeout_ms: 500 };
        let tune_error: TuneError = trial_error.into();

        match tune_error {
            TuneError::Trial(TrialError::MeasurementTimeout { timeout_ms }) => {
                assert_eq!(timeout_ms, 500)
            }
            _ => panic!("Expected Trial error"),
        }

        let config_error: TuneError = ConfigError::ZeroBudget.into();
        assert!(matches!(config_error, TuneError::Config(ConfigError::ZeroBudget)));
    }

    #[test]
    fn test_dispatch_failure_is_distinct() {
        let dispatch = TrialError::DispatchFailed {
            message: "sequencer offline".into(),
        };
        let timeout = TrialError::MeasurementTimeout { timeout_ms: 10 };

        assert!(dispatch.is_dispatch_failure());
        assert!(!timeout.is_dispatch_failure());
        assert_ne!(dispatch.kind(), timeout.kind());
    }
}
