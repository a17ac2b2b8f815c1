//! Instrument facade ports.
//!
//! One trait per instrument kind, all sharing the [`Instrument`] base
//! contract. Vendor command dialects live behind these traits; the core only
//! ever talks to the rack through them. Every call blocks until the
//! instrument answers or its bus transaction times out.

use std::collections::BTreeSet;

use crate::domain::errors::{StationError, StationResult};
use crate::domain::models::{Bandwidth, LoadMode, OutputChannel, RelayId, ScaledValue};

/// Contract shared by every instrument.
pub trait Instrument {
    /// Instrument name used in logs and errors.
    fn name(&self) -> &str;

    /// Bring the instrument to its power-on state. `false` if it refused.
    fn initialize(&mut self) -> StationResult<bool>;

    /// Reset the instrument. `false` if it refused.
    fn reset(&mut self) -> StationResult<bool>;

    /// Whether the instrument's error register is set.
    fn is_error(&mut self) -> StationResult<bool>;

    /// Drain and describe the error register.
    fn what_error(&mut self) -> StationResult<String>;
}

/// Programmable DC power supply (line or auxiliary).
pub trait PowerSupply: Instrument {
    fn set_voltage(&mut self, volts: f64) -> StationResult<()>;

    fn set_current_limit(&mut self, amps: f64) -> StationResult<()>;

    fn set_output(&mut self, enabled: bool) -> StationResult<()>;

    fn measure_voltage(&mut self) -> StationResult<ScaledValue>;

    fn measure_current(&mut self) -> StationResult<ScaledValue>;

    /// Whether the supply is currently limiting its output current.
    fn in_current_limit(&mut self) -> StationResult<bool>;
}

/// DMM function selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmmFunction {
    DcVolts,
    AcVolts,
}

/// Digital multimeter with a scanner on the DUT outputs.
pub trait Dmm: Instrument {
    fn measure(&mut self, function: DmmFunction, output: OutputChannel) -> StationResult<ScaledValue>;
}

/// Multi-channel electronic load.
pub trait ElectronicLoad: Instrument {
    fn channels(&self) -> u8;

    fn set_mode(&mut self, channel: OutputChannel, mode: LoadMode) -> StationResult<()>;

    fn set_level(&mut self, channel: OutputChannel, value: f64) -> StationResult<()>;

    fn set_enabled(&mut self, channel: OutputChannel, enabled: bool) -> StationResult<()>;

    fn set_short(&mut self, channel: OutputChannel, shorted: bool) -> StationResult<()>;

    /// Switch the channel between `low` and `high` at `frequency_hz`.
    fn set_dynamic(
        &mut self,
        channel: OutputChannel,
        low: f64,
        high: f64,
        frequency_hz: f64,
    ) -> StationResult<()>;

    /// Return the channel to static operation at its last level.
    fn clear_dynamic(&mut self, channel: OutputChannel) -> StationResult<()>;

    fn measure_current(&mut self, channel: OutputChannel) -> StationResult<ScaledValue>;
}

/// Scope measurement selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeMeasurement {
    PeakToPeak,
    Frequency,
    /// Time from trigger to the channel's first crossing.
    Delay,
    RiseTime,
    Maximum,
    Minimum,
}

/// Scope channel coupling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coupling {
    Dc,
    Ac,
}

/// Scope trigger mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerMode {
    Auto,
    Normal,
    Single,
}

/// Trigger configuration for one acquisition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trigger {
    pub source: u8,
    pub level_volts: f64,
    pub mode: TriggerMode,
    pub rising: bool,
}

/// Digital storage oscilloscope.
pub trait Oscilloscope: Instrument {
    fn set_bandwidth(&mut self, channel: u8, bandwidth: Bandwidth) -> StationResult<()>;

    fn set_coupling(&mut self, channel: u8, coupling: Coupling) -> StationResult<()>;

    fn set_vertical_scale(&mut self, channel: u8, volts_per_div: f64) -> StationResult<()>;

    fn vertical_scale(&mut self, channel: u8) -> StationResult<f64>;

    fn set_trigger(&mut self, trigger: Trigger) -> StationResult<()>;

    /// Start an acquisition with the current trigger settings.
    fn arm(&mut self) -> StationResult<()>;

    fn acquisition_complete(&mut self) -> StationResult<bool>;

    fn measure(&mut self, channel: u8, kind: ScopeMeasurement) -> StationResult<ScaledValue>;

    /// Whether the last acquisition on `channel` went off screen.
    fn is_clipping(&mut self, channel: u8) -> StationResult<bool>;

    /// Auto-range the channel's vertical scale.
    fn rescale(&mut self, channel: u8) -> StationResult<()>;
}

/// Relay/switch matrix, including the fixture's inhibit line.
pub trait RelayMatrix: Instrument {
    /// Close exactly `closed`, opening every other relay.
    fn apply(&mut self, closed: &BTreeSet<RelayId>) -> StationResult<()>;

    fn set_inhibit(&mut self, asserted: bool) -> StationResult<()>;
}

/// Function generator driving the DUT sync input.
pub trait FunctionGenerator: Instrument {
    fn set_square(&mut self, frequency_hz: f64, amplitude_volts: f64) -> StationResult<()>;

    fn set_output(&mut self, enabled: bool) -> StationResult<()>;
}

/// Temperature chamber controller.
pub trait TemperatureController: Instrument {
    fn set_temperature(&mut self, celsius: f64) -> StationResult<()>;

    fn read_temperature(&mut self) -> StationResult<ScaledValue>;

    fn at_setpoint(&mut self) -> StationResult<bool>;
}

/// Fail with the instrument's own error text when its error register is set.
pub fn check_instrument<I: Instrument + ?Sized>(instrument: &mut I) -> StationResult<()> {
    if instrument.is_error()? {
        let message = instrument.what_error()?;
        return Err(StationError::instrument(instrument.name(), message));
    }
    Ok(())
}

fn expect_ok<I: Instrument + ?Sized>(instrument: &I, ok: bool, action: &str) -> StationResult<()> {
    if ok {
        Ok(())
    } else {
        Err(StationError::instrument(instrument.name(), format!("{action} refused")))
    }
}

/// The station's instruments, passed explicitly to everything that drives
/// hardware. There is exactly one rack per station.
pub struct InstrumentRack {
    pub line: Box<dyn PowerSupply>,
    pub aux: Vec<Box<dyn PowerSupply>>,
    pub dmm: Box<dyn Dmm>,
    pub load: Box<dyn ElectronicLoad>,
    pub scope: Box<dyn Oscilloscope>,
    pub relays: Box<dyn RelayMatrix>,
    pub fgen: Box<dyn FunctionGenerator>,
    pub chamber: Option<Box<dyn TemperatureController>>,
}

impl InstrumentRack {
    /// Initialize every instrument; any refusal is an instrument error.
    pub fn initialize_all(&mut self) -> StationResult<()> {
        let ok = self.line.initialize()?;
        expect_ok(self.line.as_ref(), ok, "initialize")?;
        for supply in &mut self.aux {
            let ok = supply.initialize()?;
            expect_ok(supply.as_ref(), ok, "initialize")?;
        }
        let ok = self.dmm.initialize()?;
        expect_ok(self.dmm.as_ref(), ok, "initialize")?;
        let ok = self.load.initialize()?;
        expect_ok(self.load.as_ref(), ok, "initialize")?;
        let ok = self.scope.initialize()?;
        expect_ok(self.scope.as_ref(), ok, "initialize")?;
        let ok = self.relays.initialize()?;
        expect_ok(self.relays.as_ref(), ok, "initialize")?;
        let ok = self.fgen.initialize()?;
        expect_ok(self.fgen.as_ref(), ok, "initialize")?;
        if let Some(chamber) = self.chamber.as_mut() {
            let ok = chamber.initialize()?;
            expect_ok(chamber.as_ref(), ok, "initialize")?;
        }
        tracing::info!(aux = self.aux.len(), chamber = self.chamber.is_some(), "instrument rack initialized");
        Ok(())
    }

    /// Drive every source to a safe state after a major fault.
    pub fn emergency_shutdown(&mut self) {
        tracing::error!("emergency shutdown of instrument rack");
        self.power_down();
    }

    /// Turn every source off and open all relays.
    ///
    /// Best effort: each failure is logged and the remaining instruments are
    /// still visited.
    pub fn power_down(&mut self) {
        log_shutdown_step("line supply off", self.line.set_output(false));
        for (idx, supply) in self.aux.iter_mut().enumerate() {
            log_shutdown_step(&format!("aux supply {idx} off"), supply.set_output(false));
        }
        for channel in 1..=self.load.channels() {
            log_shutdown_step(&format!("load {channel} short off"), self.load.set_short(channel, false));
            log_shutdown_step(&format!("load {channel} off"), self.load.set_enabled(channel, false));
        }
        log_shutdown_step("function generator off", self.fgen.set_output(false));
        log_shutdown_step("relays open", self.relays.apply(&BTreeSet::new()));
    }
}

fn log_shutdown_step(step: &str, result: StationResult<()>) {
    if let Err(err) = result {
        tracing::error!(step, error = %err, "shutdown step failed");
    }
}
