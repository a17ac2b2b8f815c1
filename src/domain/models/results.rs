//! Records handed to the result sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conditions::OutputChannel;
use super::scaled::{Limits, ScaledValue};
use super::units::Units;
use crate::domain::errors::ErrorCode;

/// Name of the synthetic failing step recorded when a pre-test diagnostic
/// finds a nonrecoverable problem.
pub const DIAGNOSTIC_FAILURE_TEST: &str = "TestStepDiagnosticFacadeFailure";

/// Outcome of one executed (or short-circuited) test step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Running test counter at the time the step was recorded.
    pub test_number: u32,
    pub name: String,
    pub software_name: String,
    pub output: OutputChannel,
    pub value: ScaledValue,
    pub limits: Limits,
    pub units: Units,
    pub passed: bool,
    pub error_code: ErrorCode,
    /// Operator-facing reason for a failure that is not a plain limit miss.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// The value came from the speed-up cache rather than hardware.
    #[serde(default)]
    pub from_cache: bool,
    pub timestamp: DateTime<Utc>,
}

/// A reportable measurement that is not limit-checked as a test step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticRecord {
    pub name: String,
    pub value: ScaledValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<Limits>,
    pub units: Units,
}
