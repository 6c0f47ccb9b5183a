//! Result extraction from the analysis pipeline's artifact.
//!
//! The artifact is a text file with one labeled field per line:
//!
//! ```text
//! T : 2.5
//! N : 3000
//! ```
//!
//! Line order does not matter and unrecognized lines are ignored. `T` is in
//! micro-units and `N` in milli-units; both are converted on read.

use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use bec_types::{Measurement, MeasurementField, TrialError};
use regex::Regex;

static TEMPERATURE_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*T[ \t]*:[ \t]*(\S*)").expect("Invalid temperature line regex")
});

static ATOM_COUNT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*N[ \t]*:[ \t]*(\S*)").expect("Invalid atom count line regex")
});

/// Reads a measurement out of a result artifact.
#[async_trait]
pub trait ResultExtractor: Send + Sync {
    async fn extract(&self, path: &Path) -> Result<Measurement, TrialError>;

    fn name(&self) -> &str;
}

/// Extracts the `T` / `N` labeled fields.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledFieldExtractor {
    temperature_scale: f64,
    atom_count_scale: f64,
}

impl LabeledFieldExtractor {
    /// Micro-units to kelvin.
    pub const TEMPERATURE_SCALE: f64 = 1e-6;
    /// Milli-units to atoms.
    pub const ATOM_COUNT_SCALE: f64 = 1e3;

    pub fn new() -> Self {
        Self {
            temperature_scale: Self::TEMPERATURE_SCALE,
            atom_count_scale: Self::ATOM_COUNT_SCALE,
        }
    }

    pub fn with_scales(mut self, temperature_scale: f64, atom_count_scale: f64) -> Self {
        self.temperature_scale = temperature_scale;
        self.atom_count_scale = atom_count_scale;
        self
    }

    /// Raw value of one field, before unit conversion. The first matching
    /// line wins.
    pub fn extract_field(text: &str, field: MeasurementField) -> Result<f64, TrialError> {
        let pattern = match field {
            MeasurementField::Temperature => &*TEMPERATURE_LINE,
            MeasurementField::AtomCount => &*ATOM_COUNT_LINE,
        };

        let token = pattern
            .captures(text)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
            .ok_or(TrialError::FieldNotFound { field })?;

        match token.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(TrialError::MalformedValue {
                field,
                token: token.to_string(),
            }),
        }
    }

    /// Parse artifact text into a converted measurement.
    pub fn parse(&self, text: &str) -> Result<Measurement, TrialError> {
        let temperature = Self::extract_field(text, MeasurementField::Temperature)?;
        let atom_count = Self::extract_field(text, MeasurementField::AtomCount)?;

        Ok(Measurement {
            temperature: temperature * self.temperature_scale,
            atom_count: atom_count * self.atom_count_scale,
        })
    }
}

impl Default for LabeledFieldExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResultExtractor for LabeledFieldExtractor {
    async fn extract(&self, path: &Path) -> Result<Measurement, TrialError> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| TrialError::ArtifactUnreadable {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
        self.parse(&text)
    }

    fn name(&self) -> &str {
        "labeled_fields"
    }
}
