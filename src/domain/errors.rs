//! Fault taxonomy for the test station.
//!
//! Every fallible operation in the crate returns [`StationResult`]. The
//! [`FaultKind`] of an error decides where it is caught:
//!
//! - `Dut`: caught per step by the sequence controller, recorded as a failure
//! - `MinorStation`: caught at `synchronize`, the operator corrects and retries
//! - `MajorStation`: never caught inside the core, the caller shuts down
//! - `Programming`: invariant violations, surfaced as early as possible

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Broad fault category of a [`StationError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultKind {
    /// The device under test misbehaved.
    Dut,
    /// Fixture or configuration problem the operator can correct.
    MinorStation,
    /// The station itself is unreliable; requires emergency shutdown.
    MajorStation,
    /// A programming or invariant error.
    Programming,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Dut => "dut",
            Self::MinorStation => "minor_station",
            Self::MajorStation => "major_station",
            Self::Programming => "programming",
        };
        f.write_str(s)
    }
}

/// Device fault detected while measuring.
///
/// Raising one of these flags the DUT-error state for the rest of the
/// sequence: later steps report a bad measurement without touching hardware.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "fault")]
pub enum DutFault {
    #[error("overcurrent on output {output}")]
    Overcurrent { output: u8 },

    #[error("output {output} stayed on while inhibited")]
    InhibitFailure { output: u8 },

    #[error("output {output} is oscillating")]
    Oscillation { output: u8 },

    #[error("jumper pulled on output {output}")]
    JumperPulled { output: u8 },

    #[error("no output on channel {output}")]
    NoOutput { output: u8 },

    #[error("output {output} did not recover after short circuit")]
    NoShortRecovery { output: u8 },
}

impl DutFault {
    /// Archive code for this fault.
    pub const fn code(&self) -> u16 {
        match self {
            Self::Overcurrent { .. } => 101,
            Self::InhibitFailure { .. } => 102,
            Self::Oscillation { .. } => 103,
            Self::JumperPulled { .. } => 104,
            Self::NoOutput { .. } => 105,
            Self::NoShortRecovery { .. } => 106,
        }
    }
}

/// Error code attached to a test step and its archived record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// The `NODUTERROR` sentinel.
    #[default]
    NoDutError,
    /// A DUT fault code.
    Dut(u16),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDutError => f.write_str("NODUTERROR"),
            Self::Dut(code) => write!(f, "{code}"),
        }
    }
}

impl FromStr for ErrorCode {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("NODUTERROR") || trimmed.is_empty() {
            return Ok(Self::NoDutError);
        }
        trimmed
            .parse::<u16>()
            .map(Self::Dut)
            .map_err(|_| StationError::FileError(format!("invalid error code '{trimmed}'")))
    }
}

/// Errors raised anywhere in the station.
#[derive(Debug, Error)]
pub enum StationError {
    // DUT faults
    #[error("{0}")]
    DutFault(#[from] DutFault),

    #[error("scope measurement failed on channel {channel}: {reason}")]
    ScopeMeasure { channel: u8, reason: String },

    #[error("measurement error: {0}")]
    Measurement(String),

    // Minor station faults
    #[error("limits file error: {0}")]
    FileError(String),

    #[error("no tests found for dash '{dash}' and test type '{test_type}'")]
    NoFileFound { dash: String, test_type: String },

    #[error("fixture problem: {0}")]
    Fixture(String),

    #[error("operator abort requested")]
    OperatorAbort,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("result archive error: {0}")]
    Archive(String),

    // Major station faults
    #[error("instrument error ({instrument}): {message}")]
    Instrument { instrument: String, message: String },

    #[error("instrument timeout ({instrument})")]
    InstrumentTimeout { instrument: String },

    #[error("measurement timeout: {0}")]
    MeasurementTimeout(String),

    #[error("rescale failed on scope channel {channel}: {reason}")]
    RescaleFailed { channel: u8, reason: String },

    #[error("polling exceeded {iterations} iterations waiting for {what}")]
    InfiniteLoop { what: String, iterations: u32 },

    #[error("invalid sequence state: expected {expected}, found {found}")]
    InvalidState { expected: String, found: String },

    // Programming faults
    #[error("no measurement type registered for '{0}'")]
    NoMeasurementType(String),

    #[error("measurement type '{0}' registered twice")]
    DuplicateMeasurementType(String),

    #[error("enumeration mismatch: {0}")]
    EnumMismatch(String),
}

/// Result alias used throughout the crate.
pub type StationResult<T> = Result<T, StationError>;

impl StationError {
    /// Shorthand for an instrument communication failure.
    pub fn instrument(instrument: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Instrument {
            instrument: instrument.into(),
            message: message.into(),
        }
    }

    /// Category deciding the catch boundary of this error.
    pub const fn kind(&self) -> FaultKind {
        match self {
            Self::DutFault(_) | Self::ScopeMeasure { .. } | Self::Measurement(_) => FaultKind::Dut,
            Self::FileError(_)
            | Self::NoFileFound { .. }
            | Self::Fixture(_)
            | Self::OperatorAbort
            | Self::Config(_)
            | Self::Archive(_) => FaultKind::MinorStation,
            Self::Instrument { .. }
            | Self::InstrumentTimeout { .. }
            | Self::MeasurementTimeout(_)
            | Self::RescaleFailed { .. }
            | Self::InfiniteLoop { .. }
            | Self::InvalidState { .. } => FaultKind::MajorStation,
            Self::NoMeasurementType(_)
            | Self::DuplicateMeasurementType(_)
            | Self::EnumMismatch(_) => FaultKind::Programming,
        }
    }

    /// Whether the station must be shut down.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            FaultKind::MajorStation | FaultKind::Programming
        )
    }

    /// The detected device fault, if this error carries one.
    pub const fn dut_fault(&self) -> Option<&DutFault> {
        match self {
            Self::DutFault(fault) => Some(fault),
            _ => None,
        }
    }

    /// Error code archived with a step that failed with this error.
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::DutFault(fault) => ErrorCode::Dut(fault.code()),
            _ => ErrorCode::NoDutError,
        }
    }

    /// Operator-facing message: the test name followed by the reason.
    pub fn operator_message(&self, test: &str) -> String {
        format!("{test}: {self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_kinds() {
        assert_eq!(
            StationError::from(DutFault::Overcurrent { output: 1 }).kind(),
            FaultKind::Dut
        );
        assert_eq!(
            StationError::ScopeMeasure {
                channel: 2,
                reason: "clipping".to_string()
            }
            .kind(),
            FaultKind::Dut
        );
        assert_eq!(StationError::OperatorAbort.kind(), FaultKind::MinorStation);
        assert_eq!(
            StationError::instrument("dmm", "no response").kind(),
            FaultKind::MajorStation
        );
        assert_eq!(
            StationError::NoMeasurementType("FOO".to_string()).kind(),
            FaultKind::Programming
        );
    }

    #[test]
    fn test_fatal_errors() {
        assert!(StationError::MeasurementTimeout("scope".to_string()).is_fatal());
        assert!(StationError::EnumMismatch("bandwidth".to_string()).is_fatal());
        assert!(!StationError::Fixture("orientation".to_string()).is_fatal());
        assert!(!StationError::Measurement("no edge".to_string()).is_fatal());
    }

    #[test]
    fn test_error_code_from_dut_fault() {
        let err = StationError::from(DutFault::NoShortRecovery { output: 2 });
        assert_eq!(err.error_code(), ErrorCode::Dut(106));
        assert_eq!(
            StationError::Measurement("x".to_string()).error_code(),
            ErrorCode::NoDutError
        );
    }

    #[test]
    fn test_error_code_parse_and_display() {
        assert_eq!("NODUTERROR".parse::<ErrorCode>().unwrap(), ErrorCode::NoDutError);
        assert_eq!("noduterror".parse::<ErrorCode>().unwrap(), ErrorCode::NoDutError);
        assert_eq!(" 215 ".parse::<ErrorCode>().unwrap(), ErrorCode::Dut(215));
        assert!("E12".parse::<ErrorCode>().is_err());
        assert_eq!(ErrorCode::Dut(7).to_string(), "7");
        assert_eq!(ErrorCode::NoDutError.to_string(), "NODUTERROR");
    }

    #[test]
    fn test_operator_message() {
        let err = StationError::from(DutFault::Oscillation { output: 1 });
        assert_eq!(
            err.operator_message("VOUTDC"),
            "VOUTDC: output 1 is oscillating"
        );
    }
}
