//! Measurement units used by limits and results.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::errors::StationError;

/// Unit a test step's limits and result are expressed in.
///
/// Strategies measure in base SI units; the protocol converts with
/// [`Units::base_factor`] before the value is compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Units {
    Volts,
    Millivolts,
    Amps,
    Milliamps,
    Watts,
    Percent,
    Hertz,
    Kilohertz,
    Seconds,
    Milliseconds,
    Microseconds,
    Ohms,
    Celsius,
    #[default]
    Unitless,
}

impl Units {
    /// Size of one of these units expressed in the base SI unit.
    pub const fn base_factor(self) -> f64 {
        match self {
            Self::Millivolts | Self::Milliamps | Self::Milliseconds => 1e-3,
            Self::Microseconds => 1e-6,
            Self::Kilohertz => 1e3,
            _ => 1.0,
        }
    }

    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Volts => "V",
            Self::Millivolts => "mV",
            Self::Amps => "A",
            Self::Milliamps => "mA",
            Self::Watts => "W",
            Self::Percent => "%",
            Self::Hertz => "Hz",
            Self::Kilohertz => "kHz",
            Self::Seconds => "s",
            Self::Milliseconds => "ms",
            Self::Microseconds => "us",
            Self::Ohms => "Ohm",
            Self::Celsius => "C",
            Self::Unitless => "",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Units {
    type Err = StationError;

    // Limits files mix case freely, so "MV" and "mv" both mean millivolts.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let units = match s.trim().to_ascii_uppercase().as_str() {
            "V" | "VOLTS" => Self::Volts,
            "MV" => Self::Millivolts,
            "A" | "AMPS" => Self::Amps,
            "MA" => Self::Milliamps,
            "W" | "WATTS" => Self::Watts,
            "%" | "PERCENT" => Self::Percent,
            "HZ" => Self::Hertz,
            "KHZ" => Self::Kilohertz,
            "S" | "SEC" => Self::Seconds,
            "MS" | "MSEC" => Self::Milliseconds,
            "US" | "USEC" => Self::Microseconds,
            "OHM" | "OHMS" => Self::Ohms,
            "C" | "DEGC" => Self::Celsius,
            "" | "NONE" => Self::Unitless,
            other => {
                return Err(StationError::FileError(format!("unknown units '{other}'")));
            }
        };
        Ok(units)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_units() {
        assert_eq!("V".parse::<Units>().unwrap(), Units::Volts);
        assert_eq!("mV".parse::<Units>().unwrap(), Units::Millivolts);
        assert_eq!("khz".parse::<Units>().unwrap(), Units::Kilohertz);
        assert_eq!("%".parse::<Units>().unwrap(), Units::Percent);
        assert_eq!("".parse::<Units>().unwrap(), Units::Unitless);
        assert!("furlongs".parse::<Units>().is_err());
    }

    #[test]
    fn test_base_factor() {
        assert!((Units::Millivolts.base_factor() - 1e-3).abs() < f64::EPSILON);
        assert!((Units::Kilohertz.base_factor() - 1e3).abs() < f64::EPSILON);
        assert!((Units::Volts.base_factor() - 1.0).abs() < f64::EPSILON);
    }
}
