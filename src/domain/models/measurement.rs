//! Values produced by a measurement strategy.

use serde::{Deserialize, Serialize};

use super::conditions::OutputChannel;
use super::scaled::ScaledValue;

/// Result of one strategy run.
///
/// `values[0]` is the value compared against the step's limits; any further
/// entries are supporting readings. `extras` carries per-output results from
/// multi-output strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measured {
    pub name: String,
    pub values: Vec<ScaledValue>,
    #[serde(default)]
    pub extras: Vec<ExtraMeasurement>,
}

impl Measured {
    pub fn single(name: impl Into<String>, value: ScaledValue) -> Self {
        Self {
            name: name.into(),
            values: vec![value],
            extras: Vec::new(),
        }
    }

    /// The bad-measurement sentinel result.
    pub fn bad(name: impl Into<String>) -> Self {
        Self::single(name, ScaledValue::bad_measurement())
    }

    #[must_use]
    pub fn with_extra(mut self, extra: ExtraMeasurement) -> Self {
        self.extras.push(extra);
        self
    }

    /// The limit-checked value.
    pub fn primary(&self) -> ScaledValue {
        self.values
            .first()
            .copied()
            .unwrap_or_else(ScaledValue::bad_measurement)
    }

    pub fn is_bad(&self) -> bool {
        self.primary().is_bad()
    }
}

/// Additional per-output measurement reported alongside the primary one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtraMeasurement {
    pub name: String,
    pub output: OutputChannel,
    pub value: ScaledValue,
}
