//! Measurement pair produced by the external analysis pipeline.

use serde::{Deserialize, Serialize};

/// One measurement per trial, in SI units after unit conversion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Cloud temperature in kelvin.
    pub temperature: f64,
    /// Number of atoms.
    pub atom_count: f64,
}

impl Measurement {
    pub fn new(temperature: f64, atom_count: f64) -> Self {
        Self {
            temperature,
            atom_count,
        }
    }

    /// Both fields finite and strictly positive.
    pub fn is_physical(&self) -> bool {
        self.temperature.is_finite()
            && self.atom_count.is_finite()
            && self.temperature > 0.0
            && self.atom_count > 0.0
    }
}

/// The labeled fields of a result artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementField {
    Temperature,
    AtomCount,
}

impl MeasurementField {
    pub const ALL: [MeasurementField; 2] = [Self::Temperature, Self::AtomCount];

    /// Label used in the artifact (`T : ...`, `N : ...`).
    pub fn label(&self) -> &'static str {
        match self {
            Self::Temperature => "T",
            Self::AtomCount => "N",
        }
    }
}

impl std::fmt::Display for MeasurementField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Temperature => write!(f, "temperature (T)"),
            Self::AtomCount => write!(f, "atom count (N)"),
        }
    }
}
