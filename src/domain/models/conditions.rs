//! Physical test conditions: everything the instruments must be set to
//! before a measurement is taken.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use crate::domain::errors::StationError;

/// DUT output channel, numbered from 1.
pub type OutputChannel = u8;

/// Relay identifier on the switch matrix.
pub type RelayId = u16;

/// Operating mode of an electronic load channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadMode {
    #[default]
    ConstantCurrent,
    ConstantResistance,
    ConstantPower,
}

impl FromStr for LoadMode {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "CC" => Ok(Self::ConstantCurrent),
            "CR" => Ok(Self::ConstantResistance),
            "CP" => Ok(Self::ConstantPower),
            other => Err(StationError::FileError(format!("unknown load mode '{other}'"))),
        }
    }
}

/// Input line setpoint. `next` is the second level used by line regulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LineCondition {
    pub volts: f64,
    pub next: Option<f64>,
}

/// Setpoint for one electronic load channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoadCondition {
    pub channel: OutputChannel,
    pub mode: LoadMode,
    pub value: f64,
    /// Second level for load regulation and load transient tests.
    pub next: Option<f64>,
}

/// Auxiliary supply setpoint.
///
/// `Undefined` leaves the channel at the sequence-wide default rather than
/// driving it to 0 V.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Setpoint {
    #[default]
    Undefined,
    Volts(f64),
}

impl Setpoint {
    /// Resolve against the sequence default for this channel.
    pub fn resolve(self, default: f64) -> f64 {
        match self {
            Self::Undefined => default,
            Self::Volts(v) => v,
        }
    }
}

impl FromStr for Setpoint {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        if text.eq_ignore_ascii_case("UNDEFINED") || text.is_empty() {
            return Ok(Self::Undefined);
        }
        text.parse::<f64>()
            .map(Self::Volts)
            .map_err(|_| StationError::FileError(format!("invalid auxiliary setpoint '{text}'")))
    }
}

/// Oscilloscope bandwidth limit filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bandwidth {
    #[default]
    Full,
    Limit20MHz,
    Limit200MHz,
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Full => "FULL",
            Self::Limit20MHz => "20MHZ",
            Self::Limit200MHz => "200MHZ",
        };
        f.write_str(s)
    }
}

impl FromStr for Bandwidth {
    type Err = StationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "" | "FULL" => Ok(Self::Full),
            "20MHZ" | "20" => Ok(Self::Limit20MHz),
            "200MHZ" | "200" => Ok(Self::Limit200MHz),
            other => Err(StationError::EnumMismatch(format!("unknown bandwidth '{other}'"))),
        }
    }
}

/// External synchronisation signal from the function generator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncSignal {
    pub frequency_hz: f64,
    pub amplitude_volts: f64,
}

/// Instrument-visible setup of a test step.
///
/// Equality and hashing go through [`SetupKey`], so two steps compare equal
/// exactly when the instruments would be driven identically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conditions {
    pub line: LineCondition,
    #[serde(default)]
    pub loads: Vec<LoadCondition>,
    /// Auxiliary supply setpoints indexed by APS channel (0-based).
    #[serde(default)]
    pub aux: Vec<Setpoint>,
    #[serde(default)]
    pub bandwidth: Bandwidth,
    #[serde(default)]
    pub inhibit: bool,
    #[serde(default)]
    pub short: bool,
    #[serde(default)]
    pub sync: Option<SyncSignal>,
    #[serde(default)]
    pub relays_pre: BTreeSet<RelayId>,
    #[serde(default)]
    pub relays_mid: BTreeSet<RelayId>,
    #[serde(default)]
    pub temperature: Option<f64>,
}

impl Conditions {
    /// Conditions with only the input line set.
    pub fn new(line_volts: f64) -> Self {
        Self {
            line: LineCondition {
                volts: line_volts,
                next: None,
            },
            loads: Vec::new(),
            aux: Vec::new(),
            bandwidth: Bandwidth::Full,
            inhibit: false,
            short: false,
            sync: None,
            relays_pre: BTreeSet::new(),
            relays_mid: BTreeSet::new(),
            temperature: None,
        }
    }

    /// Add or replace a constant-current load.
    #[must_use]
    pub fn with_load(mut self, channel: OutputChannel, amps: f64) -> Self {
        self.loads.retain(|l| l.channel != channel);
        self.loads.push(LoadCondition {
            channel,
            mode: LoadMode::ConstantCurrent,
            value: amps,
            next: None,
        });
        self.loads.sort_by_key(|l| l.channel);
        self
    }

    /// Set the second load level of a channel already present.
    #[must_use]
    pub fn with_next_load(mut self, channel: OutputChannel, amps: f64) -> Self {
        if let Some(load) = self.loads.iter_mut().find(|l| l.channel == channel) {
            load.next = Some(amps);
        }
        self
    }

    #[must_use]
    pub fn with_next_line(mut self, volts: f64) -> Self {
        self.line.next = Some(volts);
        self
    }

    #[must_use]
    pub fn with_bandwidth(mut self, bandwidth: Bandwidth) -> Self {
        self.bandwidth = bandwidth;
        self
    }

    #[must_use]
    pub fn with_inhibit(mut self, inhibit: bool) -> Self {
        self.inhibit = inhibit;
        self
    }

    #[must_use]
    pub fn with_short(mut self, short: bool) -> Self {
        self.short = short;
        self
    }

    #[must_use]
    pub fn with_sync(mut self, sync: SyncSignal) -> Self {
        self.sync = Some(sync);
        self
    }

    #[must_use]
    pub fn with_aux(mut self, aux: Vec<Setpoint>) -> Self {
        self.aux = aux;
        self
    }

    #[must_use]
    pub fn with_relays_pre(mut self, relays: impl IntoIterator<Item = RelayId>) -> Self {
        self.relays_pre = relays.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_relays_mid(mut self, relays: impl IntoIterator<Item = RelayId>) -> Self {
        self.relays_mid = relays.into_iter().collect();
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, celsius: f64) -> Self {
        self.temperature = Some(celsius);
        self
    }

    /// Load setpoint for a channel, if one is specified.
    pub fn load(&self, channel: OutputChannel) -> Option<&LoadCondition> {
        self.loads.iter().find(|l| l.channel == channel)
    }

    /// Structural key over the instrument-visible fields.
    pub fn setup_key(&self) -> SetupKey {
        SetupKey {
            line: quantize(self.line.volts),
            line_next: self.line.next.map(quantize),
            loads: self
                .loads
                .iter()
                .map(|l| (l.channel, l.mode, quantize(l.value), l.next.map(quantize)))
                .collect(),
            aux: self
                .aux
                .iter()
                .map(|s| match s {
                    Setpoint::Undefined => None,
                    Setpoint::Volts(v) => Some(quantize(*v)),
                })
                .collect(),
            bandwidth: self.bandwidth,
            inhibit: self.inhibit,
            short: self.short,
            sync: self
                .sync
                .map(|s| (quantize(s.frequency_hz), quantize(s.amplitude_volts))),
            relays_pre: self.relays_pre.iter().copied().collect(),
            relays_mid: self.relays_mid.iter().copied().collect(),
            temperature: self.temperature.map(quantize),
        }
    }
}

impl PartialEq for Conditions {
    fn eq(&self, other: &Self) -> bool {
        self.setup_key() == other.setup_key()
    }
}

impl Eq for Conditions {}

impl Hash for Conditions {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.setup_key().hash(state);
    }
}

/// Hashable snapshot of [`Conditions`], floats quantised to micro-units.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SetupKey {
    line: i64,
    line_next: Option<i64>,
    loads: Vec<(OutputChannel, LoadMode, i64, Option<i64>)>,
    aux: Vec<Option<i64>>,
    bandwidth: Bandwidth,
    inhibit: bool,
    short: bool,
    sync: Option<(i64, i64)>,
    relays_pre: Vec<RelayId>,
    relays_mid: Vec<RelayId>,
    temperature: Option<i64>,
}

#[allow(clippy::cast_possible_truncation)]
fn quantize(value: f64) -> i64 {
    (value * 1e6).round() as i64
}
