//! Precision-carrying numeric values and limit checking.
//!
//! Every physical quantity in the station is a [`ScaledValue`]: a magnitude
//! plus the number of digits after the decimal point it is reported with.
//! Pass/fail decisions compare the rounded decimal representation, so a
//! reading that rounds onto a limit boundary passes.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::{StationError, StationResult};

/// A magnitude with an explicit display precision and optional clamp.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaledValue {
    #[serde(with = "nan_as_null")]
    magnitude: f64,
    precision: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    range: Option<(f64, f64)>,
}

impl ScaledValue {
    /// Finest precision the station reports.
    pub const MAX_PRECISION: u8 = 9;

    /// Create an unbounded value.
    pub fn new(magnitude: f64, precision: u8) -> Self {
        Self {
            magnitude,
            precision: precision.min(Self::MAX_PRECISION),
            range: None,
        }
    }

    /// Create a value clamped into the inclusive range `[min, max]`.
    pub fn bounded(magnitude: f64, precision: u8, min: f64, max: f64) -> Self {
        let (lo, hi) = if min <= max { (min, max) } else { (max, min) };
        Self {
            magnitude: magnitude.clamp(lo, hi),
            precision: precision.min(Self::MAX_PRECISION),
            range: Some((lo, hi)),
        }
    }

    /// Sentinel reported for steps that could not be measured.
    pub const fn bad_measurement() -> Self {
        Self {
            magnitude: f64::NAN,
            precision: 0,
            range: None,
        }
    }

    /// Whether this is the bad-measurement sentinel.
    pub fn is_bad(&self) -> bool {
        self.magnitude.is_nan()
    }

    pub const fn magnitude(&self) -> f64 {
        self.magnitude
    }

    pub const fn precision(&self) -> u8 {
        self.precision
    }

    pub const fn range(&self) -> Option<(f64, f64)> {
        self.range
    }

    /// Same magnitude reported with a different precision.
    #[must_use]
    pub fn with_precision(self, precision: u8) -> Self {
        Self {
            precision: precision.min(Self::MAX_PRECISION),
            ..self
        }
    }

    /// New value with the magnitude divided by `factor`, keeping precision and clamp.
    #[must_use]
    pub fn rescaled(self, factor: f64) -> Self {
        if self.is_bad() || (factor - 1.0).abs() < f64::EPSILON {
            return self;
        }
        let magnitude = self.magnitude / factor;
        match self.range {
            Some((lo, hi)) => Self::bounded(magnitude, self.precision, lo / factor, hi / factor),
            None => Self::new(magnitude, self.precision),
        }
    }

    /// Decimal string rounded to this value's precision.
    pub fn rounded(&self) -> String {
        self.rounded_to(self.precision)
    }

    fn rounded_to(&self, precision: u8) -> String {
        format!("{:.*}", usize::from(precision), self.magnitude)
    }

    /// The rounded string read back as an integer count of `10^-precision` units.
    ///
    /// Going through the string keeps comparisons identical to what the
    /// operator sees printed.
    fn decimal_units(&self, precision: u8) -> Option<i128> {
        if self.is_bad() || !self.magnitude.is_finite() {
            return None;
        }
        self.rounded_to(precision).replace('.', "").parse::<i128>().ok()
    }
}

impl fmt::Display for ScaledValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bad() {
            f.write_str("BAD")
        } else {
            f.write_str(&self.rounded())
        }
    }
}

impl FromStr for ScaledValue {
    type Err = StationError;

    /// Parse a decimal literal; the precision is the number of digits written
    /// after the decimal point (`"3.30"` has precision 2).
    fn from_str(s: &str) -> StationResult<Self> {
        let text = s.trim();
        let magnitude = text
            .parse::<f64>()
            .map_err(|_| StationError::FileError(format!("invalid number '{text}'")))?;
        if !magnitude.is_finite() {
            return Err(StationError::FileError(format!("invalid number '{text}'")));
        }

        let (mantissa, exponent) = match text.find(['e', 'E']) {
            Some(idx) => {
                let exp = text[idx + 1..]
                    .parse::<i32>()
                    .map_err(|_| StationError::FileError(format!("invalid exponent in '{text}'")))?;
                (&text[..idx], exp)
            }
            None => (text, 0),
        };
        let fraction_digits = mantissa
            .split_once('.')
            .map_or(0, |(_, frac)| i32::try_from(frac.len()).unwrap_or(i32::MAX));
        let precision = (fraction_digits - exponent).clamp(0, i32::from(Self::MAX_PRECISION));

        Ok(Self::new(magnitude, u8::try_from(precision).unwrap_or(Self::MAX_PRECISION)))
    }
}

/// The bad-measurement sentinel is NaN, which JSON cannot carry; it is
/// written as `null` and read back as NaN.
mod nan_as_null {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_nan() {
            serializer.serialize_none()
        } else {
            serializer.serialize_some(value)
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
    }
}

/// Acceptance band for a measured value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Limits {
    pub min: ScaledValue,
    pub max: ScaledValue,
}

impl Limits {
    pub const fn new(min: ScaledValue, max: ScaledValue) -> Self {
        Self { min, max }
    }

    /// Parse a limit pair written as decimal literals.
    pub fn parse(min: &str, max: &str) -> StationResult<Self> {
        Ok(Self::new(min.parse()?, max.parse()?))
    }

    /// The finer of the two limit precisions.
    pub fn comparison_precision(&self) -> u8 {
        self.min.precision().max(self.max.precision())
    }

    /// Whether `measured` lies inside the band once everything is rounded
    /// to [`Self::comparison_precision`]. Boundary values pass.
    pub fn check(&self, measured: &ScaledValue) -> bool {
        let precision = self.comparison_precision();
        let (Some(value), Some(lo), Some(hi)) = (
            measured.decimal_units(precision),
            self.min.decimal_units(precision),
            self.max.decimal_units(precision),
        ) else {
            return false;
        };
        lo <= value && value <= hi
    }
}

impl fmt::Display for Limits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}
