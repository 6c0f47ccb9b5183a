//! Scoring of a measurement.
//!
//! Scorers are pure functions of a [`Measurement`]. Each one declares how its
//! own output reads through [`Scorer::direction`]; the trial runner turns the
//! score into a minimized fitness with [`ObjectiveDirection::to_fitness`].

use bec_optimizer::ObjectiveDirection;
use bec_types::Measurement;

pub trait Scorer: Send + Sync {
    /// Deterministic score of a physically valid measurement.
    fn score(&self, measurement: &Measurement) -> f64;

    fn direction(&self) -> ObjectiveDirection {
        ObjectiveDirection::Minimize
    }

    fn name(&self) -> &str;
}

/// `temperature * temperature_weight - atom_count / atom_divisor`.
///
/// Lower is better: colder clouds and more atoms both lower the score.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearScorer {
    pub temperature_weight: f64,
    pub atom_divisor: f64,
}

impl LinearScorer {
    pub fn new(temperature_weight: f64, atom_divisor: f64) -> Self {
        Self {
            temperature_weight,
            atom_divisor,
        }
    }
}

impl Default for LinearScorer {
    fn default() -> Self {
        Self::new(1e8, 1e4)
    }
}

impl Scorer for LinearScorer {
    fn score(&self, m: &Measurement) -> f64 {
        m.temperature * self.temperature_weight - m.atom_count / self.atom_divisor
    }

    fn name(&self) -> &str {
        "linear"
    }
}

/// `atom_weight * log10(atom_count) - temperature_weight * T[nK]`.
///
/// Higher is better, so the direction is [`ObjectiveDirection::Maximize`].
#[derive(Debug, Clone, PartialEq)]
pub struct LogAtomScorer {
    pub atom_weight: f64,
    pub temperature_weight: f64,
}

impl LogAtomScorer {
    pub fn new(atom_weight: f64, temperature_weight: f64) -> Self {
        Self {
            atom_weight,
            temperature_weight,
        }
    }
}

impl Default for LogAtomScorer {
    fn default() -> Self {
        Self::new(0.5, 5.0)
    }
}

impl Scorer for LogAtomScorer {
    fn score(&self, m: &Measurement) -> f64 {
        self.atom_weight * m.atom_count.log10() - self.temperature_weight * (m.temperature * 1e9)
    }

    fn direction(&self) -> ObjectiveDirection {
        ObjectiveDirection::Maximize
    }

    fn name(&self) -> &str {
        "log_atom"
    }
}
