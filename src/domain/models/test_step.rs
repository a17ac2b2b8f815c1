//! Test-step descriptors built from limits-file records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::conditions::{
    Bandwidth, Conditions, LineCondition, LoadCondition, LoadMode, OutputChannel, RelayId,
    Setpoint, SyncSignal,
};
use super::scaled::Limits;
use super::units::Units;
use crate::domain::errors::{ErrorCode, StationError, StationResult};

/// One raw row from the limits/variables provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestRecord {
    pub name: String,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
}

impl TestRecord {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Builder-style parameter insert; keys are stored upper-case.
    #[must_use]
    pub fn param(mut self, key: &str, value: impl Into<String>) -> Self {
        self.parameters.insert(key.to_ascii_uppercase(), value.into());
        self
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    fn require(&self, key: &str) -> StationResult<&str> {
        self.get(key).ok_or_else(|| {
            StationError::FileError(format!("test '{}' is missing parameter {key}", self.name))
        })
    }
}

/// Test name split into its software type and operator-facing label.
///
/// A limits-file name of the form `VOUTDC = Main Output` runs the `VOUTDC`
/// strategy and is displayed as `Main Output`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestName {
    pub software: String,
    pub display: String,
}

impl TestName {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('=') {
            Some((software, display)) if !display.trim().is_empty() => Self {
                software: software.trim().to_ascii_uppercase(),
                display: display.trim().to_string(),
            },
            Some((software, _)) => Self::plain(software),
            None => Self::plain(raw),
        }
    }

    fn plain(name: &str) -> Self {
        let software = name.trim().to_ascii_uppercase();
        Self {
            display: software.clone(),
            software,
        }
    }
}

impl fmt::Display for TestName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

/// Immutable description of one test step.
///
/// The measured value lives in the step's outcome record, never here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestStep {
    index: usize,
    name: TestName,
    output: OutputChannel,
    conditions: Conditions,
    limits: Limits,
    units: Units,
    speedup: bool,
    error_code: ErrorCode,
}

impl TestStep {
    pub fn new(
        index: usize,
        name: &str,
        output: OutputChannel,
        conditions: Conditions,
        limits: Limits,
        units: Units,
    ) -> Self {
        Self {
            index,
            name: TestName::parse(name),
            output,
            conditions,
            limits,
            units,
            speedup: true,
            error_code: ErrorCode::NoDutError,
        }
    }

    #[must_use]
    pub const fn with_speedup(mut self, speedup: bool) -> Self {
        self.speedup = speedup;
        self
    }

    #[must_use]
    pub const fn with_error_code(mut self, code: ErrorCode) -> Self {
        self.error_code = code;
        self
    }

    /// Build a descriptor from a provider record.
    pub fn from_record(index: usize, record: &TestRecord) -> StationResult<Self> {
        let name = TestName::parse(&record.name);
        let output = match record.get("OUTPUT") {
            Some(v) => parse_number::<OutputChannel>(record, "OUTPUT", v)?,
            None => 1,
        };
        if output == 0 {
            return Err(StationError::FileError(format!(
                "test '{}' has output channel 0; channels start at 1",
                record.name
            )));
        }

        let limits = Limits::parse(record.require("MIN")?, record.require("MAX")?)?;
        let units = record.get("UNITS").map_or(Ok(Units::Unitless), Units::from_str)?;
        let speedup = record.get("SPEEDUP").map_or(Ok(true), |v| parse_flag(record, "SPEEDUP", v))?;
        let error_code = record
            .get("ERROR_CODE")
            .map_or(Ok(ErrorCode::NoDutError), ErrorCode::from_str)?;

        Ok(Self {
            index,
            name,
            output,
            conditions: parse_conditions(record)?,
            limits,
            units,
            speedup,
            error_code,
        })
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    pub const fn name(&self) -> &TestName {
        &self.name
    }

    /// Canonical strategy name.
    pub fn software_name(&self) -> &str {
        &self.name.software
    }

    pub fn display_name(&self) -> &str {
        &self.name.display
    }

    pub const fn output(&self) -> OutputChannel {
        self.output
    }

    pub const fn conditions(&self) -> &Conditions {
        &self.conditions
    }

    pub const fn limits(&self) -> &Limits {
        &self.limits
    }

    pub const fn units(&self) -> Units {
        self.units
    }

    /// Whether this step may reuse a measurement from an identical setup.
    pub const fn speedup_eligible(&self) -> bool {
        self.speedup
    }

    pub const fn error_code(&self) -> ErrorCode {
        self.error_code
    }
}

fn parse_conditions(record: &TestRecord) -> StationResult<Conditions> {
    let line = LineCondition {
        volts: parse_number(record, "VIN", record.require("VIN")?)?,
        next: record
            .get("VIN_NEXT")
            .map(|v| parse_number(record, "VIN_NEXT", v))
            .transpose()?,
    };

    let values = record.get("LOAD").map(split_list).unwrap_or_default();
    let nexts = record.get("LOAD_NEXT").map(split_list).unwrap_or_default();
    let modes = record.get("LOAD_MODE").map(split_list).unwrap_or_default();
    let mut loads = Vec::with_capacity(values.len());
    for (idx, value) in values.iter().enumerate() {
        let channel = OutputChannel::try_from(idx + 1).map_err(|_| {
            StationError::FileError(format!("test '{}' lists too many loads", record.name))
        })?;
        let mode = match modes.get(idx).or_else(|| modes.first()) {
            Some(m) => m.parse::<LoadMode>()?,
            None => LoadMode::ConstantCurrent,
        };
        let next = match nexts.get(idx) {
            Some(n) if *n != "-" => Some(parse_number(record, "LOAD_NEXT", n)?),
            _ => None,
        };
        loads.push(LoadCondition {
            channel,
            mode,
            value: parse_number(record, "LOAD", value)?,
            next,
        });
    }

    let aux = record
        .get("APS")
        .map(split_list)
        .unwrap_or_default()
        .iter()
        .map(|s| s.parse::<Setpoint>())
        .collect::<StationResult<Vec<_>>>()?;

    let sync = match (record.get("SYNC_FREQ"), record.get("SYNC_AMPL")) {
        (Some(freq), ampl) => Some(SyncSignal {
            frequency_hz: parse_number(record, "SYNC_FREQ", freq)?,
            amplitude_volts: match ampl {
                Some(a) => parse_number(record, "SYNC_AMPL", a)?,
                None => DEFAULT_SYNC_AMPLITUDE,
            },
        }),
        (None, Some(_)) => {
            return Err(StationError::FileError(format!(
                "test '{}' sets SYNC_AMPL without SYNC_FREQ",
                record.name
            )));
        }
        (None, None) => None,
    };

    Ok(Conditions {
        line,
        loads,
        aux,
        bandwidth: record
            .get("BANDWIDTH")
            .map_or(Ok(Bandwidth::Full), str::parse::<Bandwidth>)?,
        inhibit: record.get("INHIBIT").map_or(Ok(false), |v| parse_flag(record, "INHIBIT", v))?,
        short: record.get("SHORT").map_or(Ok(false), |v| parse_flag(record, "SHORT", v))?,
        sync,
        relays_pre: parse_relays(record, "RELAYS_PRE")?,
        relays_mid: parse_relays(record, "RELAYS_MID")?,
        temperature: record
            .get("TEMPERATURE")
            .map(|v| parse_number(record, "TEMPERATURE", v))
            .transpose()?,
    })
}

const DEFAULT_SYNC_AMPLITUDE: f64 = 5.0;

fn split_list(value: &str) -> Vec<&str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).collect()
}

fn parse_relays(record: &TestRecord, key: &str) -> StationResult<BTreeSet<RelayId>> {
    record
        .get(key)
        .map(split_list)
        .unwrap_or_default()
        .into_iter()
        .map(|r| parse_number::<RelayId>(record, key, r))
        .collect()
}

fn parse_number<T: FromStr>(record: &TestRecord, key: &str, value: &str) -> StationResult<T> {
    value.trim().parse::<T>().map_err(|_| {
        StationError::FileError(format!(
            "test '{}' has invalid {key} value '{value}'",
            record.name
        ))
    })
}

fn parse_flag(record: &TestRecord, key: &str, value: &str) -> StationResult<bool> {
    match value.trim().to_ascii_uppercase().as_str() {
        "1" | "TRUE" | "YES" | "ON" | "Y" => Ok(true),
        "0" | "FALSE" | "NO" | "OFF" | "N" => Ok(false),
        _ => Err(StationError::FileError(format!(
            "test '{}' has invalid {key} flag '{value}'",
            record.name
        ))),
    }
}
