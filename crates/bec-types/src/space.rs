//! Search space definitions and parameter vectors.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::errors::ConfigError;

/// A single parameter dimension in the search space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDef {
    /// Human-readable parameter name (e.g. "tof").
    pub name: String,
    /// The kind of search range.
    pub kind: ParameterKind,
}

/// Describes how a parameter is sampled. Bounds are inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParameterKind {
    /// Continuous range [low, high].
    Continuous { low: f64, high: f64 },
    /// Integer range [low, high].
    Integer { low: i64, high: i64 },
}

impl ParameterKind {
    fn bounds(&self) -> (f64, f64) {
        match self {
            Self::Continuous { low, high } => (*low, *high),
            Self::Integer { low, high } => (*low as f64, *high as f64),
        }
    }
}

/// A concrete parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
}

impl ParameterValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Int(v) => *v as f64,
            Self::Float(v) => *v,
        }
    }
}

impl std::fmt::Display for ParameterValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
        }
    }
}

/// One named entry of a [`ParameterVector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterEntry {
    pub name: String,
    pub value: ParameterValue,
}

/// Ordered parameter values, one per search space dimension, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterVector {
    entries: Vec<ParameterEntry>,
}

impl ParameterVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: ParameterValue) -> Self {
        self.entries.push(ParameterEntry {
            name: name.into(),
            value,
        });
        self
    }

    pub fn get(&self, name: &str) -> Option<ParameterValue> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, ParameterValue)> {
        self.entries
            .iter()
            .map(|entry| (entry.name.as_str(), entry.value))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn values(&self) -> Vec<f64> {
        self.entries.iter().map(|entry| entry.value.as_f64()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Name -> number mapping handed to the experiment control system.
    pub fn to_record(&self) -> serde_json::Map<String, serde_json::Value> {
        self.entries
            .iter()
            .map(|entry| {
                let value = match entry.value {
                    ParameterValue::Int(v) => serde_json::Value::from(v),
                    ParameterValue::Float(v) => serde_json::Value::from(v),
                };
                (entry.name.clone(), value)
            })
            .collect()
    }
}

impl std::fmt::Display for ParameterVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, entry) in self.entries.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", entry.name, entry.value)?;
        }
        Ok(())
    }
}

/// The full search space: an ordered list of parameter definitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterDef>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add_float(mut self, name: impl Into<String>, low: f64, high: f64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Continuous { low, high },
        });
        self
    }

    pub fn add_int(mut self, name: impl Into<String>, low: i64, high: i64) -> Self {
        self.parameters.push(ParameterDef {
            name: name.into(),
            kind: ParameterKind::Integer { low, high },
        });
        self
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn dimension(&self, name: &str) -> Option<&ParameterDef> {
        self.parameters.iter().find(|param| param.name == name)
    }

    /// Check names and bounds. Reports the first offending dimension.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.parameters.is_empty() {
            return Err(ConfigError::EmptySearchSpace);
        }

        let mut seen = HashSet::new();
        for (index, param) in self.parameters.iter().enumerate() {
            if param.name.trim().is_empty() {
                return Err(ConfigError::UnnamedDimension { index });
            }
            if !seen.insert(param.name.as_str()) {
                return Err(ConfigError::DuplicateDimension {
                    name: param.name.clone(),
                });
            }

            let ordered = match &param.kind {
                ParameterKind::Continuous { low, high } => {
                    low.is_finite() && high.is_finite() && low < high
                }
                ParameterKind::Integer { low, high } => low < high,
            };
            if !ordered {
                let (low, high) = param.kind.bounds();
                return Err(ConfigError::InvalidBounds {
                    dimension: param.name.clone(),
                    low,
                    high,
                });
            }
        }

        Ok(())
    }

    /// Map a point of the unit hypercube into the space. Coordinates outside
    /// [0, 1] are clamped, integers are bucketed uniformly over their range.
    pub fn from_unit(&self, unit: &[f64]) -> ParameterVector {
        let mut vector = ParameterVector::new();

        for (param, &u) in self.parameters.iter().zip(unit) {
            let u = if u.is_finite() { u.clamp(0.0, 1.0) } else { 0.5 };
            let value = match &param.kind {
                ParameterKind::Continuous { low, high } => {
                    ParameterValue::Float((low + u * (high - low)).clamp(*low, *high))
                }
                ParameterKind::Integer { low, high } => {
                    // i128 so that the full i64 range neither overflows nor wraps.
                    let (low, high) = (*low as i128, *high as i128);
                    let span = (high - low + 1) as f64;
                    let offset = (u * span).floor() as i128;
                    ParameterValue::Int((low + offset).clamp(low, high) as i64)
                }
            };
            vector = vector.with(param.name.clone(), value);
        }

        vector
    }

    /// Normalize a vector into the unit hypercube, dimension by dimension.
    pub fn to_unit(&self, vector: &ParameterVector) -> Vec<f64> {
        self.parameters
            .iter()
            .map(|param| {
                let (low, high) = param.kind.bounds();
                match vector.get(&param.name) {
                    Some(value) if high > low => {
                        ((value.as_f64() - low) / (high - low)).clamp(0.0, 1.0)
                    }
                    _ => 0.5,
                }
            })
            .collect()
    }

    /// Whether `vector` has exactly this space's dimensions, in order, with
    /// every value of the declared type and inside its bounds.
    pub fn contains(&self, vector: &ParameterVector) -> bool {
        if vector.len() != self.parameters.len() {
            return false;
        }

        self.parameters
            .iter()
            .zip(vector.iter())
            .all(|(param, (name, value))| {
                param.name == name
                    && match (&param.kind, value) {
                        (ParameterKind::Continuous { low, high }, ParameterValue::Float(v)) => {
                            v >= *low && v <= *high
                        }
                        (ParameterKind::Integer { low, high }, ParameterValue::Int(v)) => {
                            v >= *low && v <= *high
                        }
                        _ => false,
                    }
            })
    }
}

impl Default for SearchSpace {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_space() -> SearchSpace {
        SearchSpace::new()
            .add_float("tof", 0.1, 3.0)
            .add_int("shots", 1, 5)
            .add_float("evap_ramp_ms", 5.0, 25.0)
    }

    #[test]
    fn search_space_builder_chain() {
        let space = sample_space();
        assert_eq!(space.len(), 3);
        assert!(space.validate().is_ok());
        assert!(space.dimension("shots").is_some());
        assert!(space.dimension("missing").is_none());
    }

    #[test]
    fn validate_rejects_inverted_bounds() {
        let space = SearchSpace::new().add_float("tof", 3.0, 0.1);
        match space.validate() {
            Err(ConfigError::InvalidBounds { dimension, .. }) => assert_eq!(dimension, "tof"),
            other => panic!("unexpected validation result: {other:?}"),
        }

        let degenerate = SearchSpace::new().add_int("shots", 4, 4);
        assert!(matches!(
            degenerate.validate(),
            Err(ConfigError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn validate_rejects_bad_names() {
        let unnamed = SearchSpace::new().add_float("tof", 0.1, 3.0).add_float("", 0.0, 1.0);
        assert_eq!(
            unnamed.validate(),
            Err(ConfigError::UnnamedDimension { index: 1 })
        );

        let duplicate = SearchSpace::new().add_float("tof", 0.1, 3.0).add_int("tof", 1, 2);
        assert_eq!(
            duplicate.validate(),
            Err(ConfigError::DuplicateDimension { name: "tof".into() })
        );

        assert_eq!(
            SearchSpace::new().validate(),
            Err(ConfigError::EmptySearchSpace)
        );
    }

    #[test]
    fn from_unit_hits_bounds_and_stays_inside() {
        let space = sample_space();

        let low = space.from_unit(&[0.0, 0.0, 0.0]);
        assert_eq!(low.get("tof"), Some(ParameterValue::Float(0.1)));
        assert_eq!(low.get("shots"), Some(ParameterValue::Int(1)));

        let high = space.from_unit(&[1.0, 1.0, 1.0]);
        assert_eq!(high.get("tof"), Some(ParameterValue::Float(3.0)));
        assert_eq!(high.get("shots"), Some(ParameterValue::Int(5)));

        let wild = space.from_unit(&[-4.0, 7.0, f64::NAN]);
        assert!(space.contains(&wild));
    }

    #[test]
    fn full_width_integer_range_maps_without_overflow() {
        let space = SearchSpace::new().add_int("n", i64::MIN, i64::MAX);
        assert!(space.validate().is_ok());

        assert_eq!(space.from_unit(&[0.0]).get("n"), Some(ParameterValue::Int(i64::MIN)));
        assert_eq!(space.from_unit(&[1.0]).get("n"), Some(ParameterValue::Int(i64::MAX)));
        assert!(space.contains(&space.from_unit(&[0.5])));
    }

    #[test]
    fn integer_bounds_are_compared_exactly() {
        let big = 1_i64 << 60;
        assert!(SearchSpace::new().add_int("n", big, big + 1).validate().is_ok());
        assert!(SearchSpace::new().add_int("n", big + 1, big).validate().is_err());
    }

    #[test]
    fn integer_buckets_are_uniform() {
        let space = SearchSpace::new().add_int("n", 0, 1);
        assert_eq!(space.from_unit(&[0.49]).get("n"), Some(ParameterValue::Int(0)));
        assert_eq!(space.from_unit(&[0.51]).get("n"), Some(ParameterValue::Int(1)));
    }

    #[test]
    fn to_unit_inverts_continuous_dimensions() {
        let space = SearchSpace::new().add_float("x", 10.0, 20.0);
        let vector = space.from_unit(&[0.25]);
        let unit = space.to_unit(&vector);
        assert!((unit[0] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn contains_checks_order_type_and_bounds() {
        let space = SearchSpace::new().add_float("a", 0.0, 1.0).add_int("b", 1, 3);

        let good = ParameterVector::new()
            .with("a", ParameterValue::Float(0.5))
            .with("b", ParameterValue::Int(2));
        assert!(space.contains(&good));

        let swapped = ParameterVector::new()
            .with("b", ParameterValue::Int(2))
            .with("a", ParameterValue::Float(0.5));
        assert!(!space.contains(&swapped));

        let wrong_type = ParameterVector::new()
            .with("a", ParameterValue::Float(0.5))
            .with("b", ParameterValue::Float(2.0));
        assert!(!space.contains(&wrong_type));

        let outside = ParameterVector::new()
            .with("a", ParameterValue::Float(1.5))
            .with("b", ParameterValue::Int(2));
        assert!(!space.contains(&outside));
    }

    #[test]
    fn record_and_display() {
        let vector = ParameterVector::new()
            .with("tof", ParameterValue::Float(1.5))
            .with("shots", ParameterValue::Int(3));

        let record = vector.to_record();
        assert_eq!(record["tof"], serde_json::json!(1.5));
        assert_eq!(record["shots"], serde_json::json!(3));
        assert_eq!(vector.to_string(), "tof=1.5, shots=3");
    }

    #[test]
    fn parameter_vector_serde_keeps_value_types() {
        let vector = ParameterVector::new()
            .with("tof", ParameterValue::Float(2.0))
            .with("shots", ParameterValue::Int(3));

        let json = serde_json::to_string(&vector).unwrap();
        let back: ParameterVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, vector);
    }
}
