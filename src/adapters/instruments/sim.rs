//! Simulated instrument rack.
//!
//! Every sim facade shares one [`SimBench`], which models a multi-output
//! DC-DC converter wired to the station. Tests inject faults and read call
//! counters through the bench handle.

use std::cell::{RefCell, RefMut};
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use crate::domain::errors::{StationError, StationResult};
use crate::domain::models::{Bandwidth, LoadMode, OutputChannel, RelayId, ScaledValue};
use crate::domain::ports::{
    Coupling, Dmm, DmmFunction, ElectronicLoad, FunctionGenerator, Instrument, InstrumentRack,
    Oscilloscope, PowerSupply, RelayMatrix, ScopeMeasurement, TemperatureController, Trigger,
    TriggerMode,
};

/// Line voltage the DUT model is specified at.
const NOMINAL_LINE_VOLTS: f64 = 48.0;

/// Precision reported by the simulated instruments.
const READBACK_PRECISION: u8 = 9;

/// Electrical behaviour of the simulated DUT.
#[derive(Debug, Clone)]
pub struct SimDut {
    /// Unloaded output voltage per output, output 1 first.
    pub nominal_volts: Vec<f64>,
    pub efficiency: f64,
    pub idle_input_amps: f64,
    pub inhibit_input_amps: f64,
    pub switching_hz: f64,
    pub ripple_volts: f64,
    pub transient_volts: f64,
    pub turn_on_delay_s: f64,
    pub rise_time_s: f64,
    pub undervoltage_lockout: f64,
    /// Output change per volt of line away from nominal.
    pub line_regulation: f64,
    /// Output drop per amp on the same output.
    pub load_regulation_ohms: f64,
    /// Output drop per amp drawn from the other outputs.
    pub cross_regulation_ohms: f64,
    pub short_circuit_amps: f64,
}

impl Default for SimDut {
    fn default() -> Self {
        Self {
            nominal_volts: vec![5.0, 12.0],
            efficiency: 0.9,
            idle_input_amps: 0.05,
            inhibit_input_amps: 0.002,
            switching_hz: 400_000.0,
            ripple_volts: 0.02,
            transient_volts: 0.15,
            turn_on_delay_s: 0.004,
            rise_time_s: 0.001,
            undervoltage_lockout: 18.0,
            line_regulation: 0.000_5,
            load_regulation_ohms: 0.005,
            cross_regulation_ohms: 0.001,
            short_circuit_amps: 6.0,
        }
    }
}

/// Instrument kinds, used to target injected bus failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimKind {
    LineSupply,
    AuxSupply,
    Dmm,
    Load,
    Scope,
    RelayMatrix,
    FunctionGenerator,
    Chamber,
}

/// Injectable faults. Counters decrement as they fire.
#[derive(Debug, Clone, Default)]
pub struct SimFaults {
    pub overcurrent: bool,
    pub reversed: bool,
    pub bad_connection: bool,
    pub inhibit_ignored: bool,
    pub no_short_recovery: bool,
    pub no_output: bool,
    /// Scope measurements that will raise the error register.
    pub scope_failures: u32,
    /// Scope readings that will report clipping.
    pub clipping: u32,
    pub stuck_acquisition: bool,
    pub rescale_fails: bool,
    pub bus_failure: Option<SimKind>,
    pub refuse_init: bool,
}

/// Per-kind call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimCounters {
    /// Every facade call of any kind.
    pub total_calls: u32,
    /// Line supply set commands.
    pub line_commands: u32,
    pub aux_commands: u32,
    pub dmm_reads: u32,
    pub load_commands: u32,
    pub scope_measures: u32,
    pub scope_rescales: u32,
    pub relay_commands: u32,
    pub fgen_commands: u32,
}

#[derive(Debug, Clone, Copy, Default)]
struct SimLoad {
    mode: LoadMode,
    level: f64,
    enabled: bool,
    shorted: bool,
    dynamic: bool,
}

#[derive(Debug)]
struct SimState {
    dut: SimDut,
    faults: SimFaults,
    counters: SimCounters,
    line_volts: f64,
    line_setpoints: Vec<f64>,
    line_limit: f64,
    line_on: bool,
    aux: Vec<(f64, bool)>,
    loads: Vec<SimLoad>,
    inhibit: bool,
    relays: BTreeSet<RelayId>,
    sync: Option<(f64, f64)>,
    sync_on: bool,
    scope_scale: BTreeMap<u8, f64>,
    trigger: Option<Trigger>,
    armed: bool,
    scope_error: Option<String>,
    chamber_celsius: f64,
    latched_off: BTreeSet<OutputChannel>,
}

impl SimState {
    fn new(dut: SimDut, load_channels: u8, aux_channels: usize) -> Self {
        Self {
            dut,
            faults: SimFaults::default(),
            counters: SimCounters::default(),
            line_volts: 0.0,
            line_setpoints: Vec::new(),
            line_limit: 0.0,
            line_on: false,
            aux: vec![(0.0, false); aux_channels],
            loads: vec![SimLoad::default(); usize::from(load_channels)],
            inhibit: false,
            relays: BTreeSet::new(),
            sync: None,
            sync_on: false,
            scope_scale: BTreeMap::new(),
            trigger: None,
            armed: false,
            scope_error: None,
            chamber_celsius: 25.0,
            latched_off: BTreeSet::new(),
        }
    }

    fn load(&self, channel: OutputChannel) -> Option<&SimLoad> {
        usize::from(channel).checked_sub(1).and_then(|idx| self.loads.get(idx))
    }

    fn load_mut(&mut self, name: &str, channel: OutputChannel) -> StationResult<&mut SimLoad> {
        usize::from(channel)
            .checked_sub(1)
            .and_then(|idx| self.loads.get_mut(idx))
            .ok_or_else(|| StationError::instrument(name, format!("no load channel {channel}")))
    }

    fn nominal(&self, output: OutputChannel) -> Option<f64> {
        usize::from(output)
            .checked_sub(1)
            .and_then(|idx| self.dut.nominal_volts.get(idx))
            .copied()
    }

    fn converter_running(&self) -> bool {
        self.line_on
            && self.line_volts >= self.dut.undervoltage_lockout
            && !self.faults.no_output
            && (!self.inhibit || self.faults.inhibit_ignored)
    }

    /// Current the load draws from `output`, ignoring regulation.
    fn drawn_amps(&self, output: OutputChannel) -> f64 {
        let (Some(load), Some(nominal)) = (self.load(output), self.nominal(output)) else {
            return 0.0;
        };
        if !load.enabled || !self.converter_running() || self.latched_off.contains(&output) {
            return 0.0;
        }
        if load.shorted {
            return self.dut.short_circuit_amps;
        }
        match load.mode {
            LoadMode::ConstantCurrent => load.level,
            LoadMode::ConstantResistance if load.level > 0.0 => nominal / load.level,
            LoadMode::ConstantPower if nominal > 0.0 => load.level / nominal,
            _ => 0.0,
        }
    }

    fn output_volts(&self, output: OutputChannel) -> f64 {
        let Some(nominal) = self.nominal(output) else {
            return 0.0;
        };
        if !self.converter_running()
            || self.latched_off.contains(&output)
            || self.load(output).is_some_and(|l| l.shorted)
        {
            return 0.0;
        }
        let own = self.drawn_amps(output);
        let others: f64 = (1..=self.output_count())
            .filter(|&ch| ch != output)
            .map(|ch| self.drawn_amps(ch))
            .sum();
        let volts = nominal
            + self.dut.line_regulation * (self.line_volts - NOMINAL_LINE_VOLTS)
            - self.dut.load_regulation_ohms * own
            - self.dut.cross_regulation_ohms * others;
        if self.faults.reversed && output == 1 {
            -volts
        } else {
            volts
        }
    }

    fn output_count(&self) -> OutputChannel {
        OutputChannel::try_from(self.dut.nominal_volts.len()).unwrap_or(OutputChannel::MAX)
    }

    fn input_amps(&self) -> f64 {
        if !self.line_on || self.line_volts < self.dut.undervoltage_lockout {
            return 0.0;
        }
        if self.faults.overcurrent {
            return self.line_limit;
        }
        if self.inhibit && !self.faults.inhibit_ignored {
            return self.dut.inhibit_input_amps;
        }
        let output_power: f64 = (1..=self.output_count())
            .map(|ch| self.output_volts(ch).abs() * self.drawn_amps(ch))
            .sum();
        output_power / (self.dut.efficiency * self.line_volts) + self.dut.idle_input_amps
    }

    fn scope_reading(&self, channel: u8, kind: ScopeMeasurement) -> f64 {
        let running = self.converter_running() && !self.latched_off.contains(&channel);
        let dynamic = self.load(channel).is_some_and(|l| l.dynamic);
        match kind {
            ScopeMeasurement::PeakToPeak if dynamic => self.dut.transient_volts,
            ScopeMeasurement::PeakToPeak => {
                if running {
                    self.dut.ripple_volts
                } else {
                    0.0
                }
            }
            ScopeMeasurement::Frequency if !running => f64::NAN,
            ScopeMeasurement::Frequency => match self.sync {
                Some((hz, _)) if self.sync_on => hz,
                _ => self.dut.switching_hz,
            },
            ScopeMeasurement::Delay => self.dut.turn_on_delay_s,
            ScopeMeasurement::RiseTime => self.dut.rise_time_s,
            ScopeMeasurement::Maximum => self.output_volts(channel) + self.dut.ripple_volts / 2.0,
            ScopeMeasurement::Minimum => self.output_volts(channel) - self.dut.ripple_volts / 2.0,
        }
    }

    fn triggered(&self) -> bool {
        match self.trigger {
            Some(trigger) if trigger.mode == TriggerMode::Single => {
                self.output_volts(trigger.source).abs() >= trigger.level_volts.abs()
            }
            _ => true,
        }
    }
}

/// Shared handle to the simulated bench.
#[derive(Debug, Clone)]
pub struct SimBench {
    state: Rc<RefCell<SimState>>,
    load_channels: u8,
    aux_channels: usize,
}

impl Default for SimBench {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBench {
    /// Default DUT, two load channels, one auxiliary supply.
    pub fn new() -> Self {
        Self::with_layout(SimDut::default(), 2, 1)
    }

    pub fn with_layout(dut: SimDut, load_channels: u8, aux_channels: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState::new(dut, load_channels, aux_channels))),
            load_channels,
            aux_channels,
        }
    }

    /// A full rack of sim facades with no temperature chamber.
    pub fn rack(&self) -> InstrumentRack {
        InstrumentRack {
            line: Box::new(self.line_supply()),
            aux: (0..self.aux_channels)
                .map(|idx| Box::new(self.aux_supply(idx)) as Box<dyn PowerSupply>)
                .collect(),
            dmm: Box::new(self.dmm()),
            load: Box::new(self.load()),
            scope: Box::new(self.scope()),
            relays: Box::new(self.relay_matrix()),
            fgen: Box::new(self.function_generator()),
            chamber: None,
        }
    }

    /// [`Self::rack`] with a temperature chamber fitted.
    pub fn rack_with_chamber(&self) -> InstrumentRack {
        let mut rack = self.rack();
        rack.chamber = Some(Box::new(self.chamber()));
        rack
    }

    pub fn line_supply(&self) -> SimSupply {
        SimSupply {
            bench: self.clone(),
            name: "sim-line".to_string(),
            aux_index: None,
        }
    }

    pub fn aux_supply(&self, index: usize) -> SimSupply {
        SimSupply {
            bench: self.clone(),
            name: format!("sim-aux{}", index + 1),
            aux_index: Some(index),
        }
    }

    pub fn dmm(&self) -> SimDmm {
        SimDmm { bench: self.clone() }
    }

    pub fn load(&self) -> SimLoadBank {
        SimLoadBank {
            bench: self.clone(),
            channels: self.load_channels,
        }
    }

    pub fn scope(&self) -> SimScope {
        SimScope { bench: self.clone() }
    }

    pub fn relay_matrix(&self) -> SimRelayMatrix {
        SimRelayMatrix { bench: self.clone() }
    }

    pub fn function_generator(&self) -> SimFunctionGenerator {
        SimFunctionGenerator { bench: self.clone() }
    }

    pub fn chamber(&self) -> SimChamber {
        SimChamber { bench: self.clone() }
    }

    pub fn faults_mut(&self) -> RefMut<'_, SimFaults> {
        RefMut::map(self.state.borrow_mut(), |s| &mut s.faults)
    }

    pub fn dut_mut(&self) -> RefMut<'_, SimDut> {
        RefMut::map(self.state.borrow_mut(), |s| &mut s.dut)
    }

    pub fn counters(&self) -> SimCounters {
        self.state.borrow().counters
    }

    /// Zero the call counters and forget the line setpoint history.
    pub fn reset_counters(&self) {
        let mut state = self.state.borrow_mut();
        state.counters = SimCounters::default();
        state.line_setpoints.clear();
    }

    pub fn line_volts(&self) -> f64 {
        self.state.borrow().line_volts
    }

    /// Every voltage commanded to the line supply, oldest first.
    pub fn line_setpoints(&self) -> Vec<f64> {
        self.state.borrow().line_setpoints.clone()
    }

    pub fn line_enabled(&self) -> bool {
        self.state.borrow().line_on
    }

    pub fn inhibit(&self) -> bool {
        self.state.borrow().inhibit
    }

    pub fn closed_relays(&self) -> BTreeSet<RelayId> {
        self.state.borrow().relays.clone()
    }

    pub fn aux_volts(&self, index: usize) -> Option<f64> {
        self.state.borrow().aux.get(index).map(|(v, _)| *v)
    }

    pub fn load_level(&self, channel: OutputChannel) -> Option<f64> {
        self.state.borrow().load(channel).map(|l| l.level)
    }

    pub fn scope_scale(&self, channel: u8) -> Option<f64> {
        self.state.borrow().scope_scale.get(&channel).copied()
    }

    /// Count a call and fail it if `kind` has an injected bus failure.
    fn call(&self, kind: SimKind, name: &str) -> StationResult<RefMut<'_, SimState>> {
        let mut state = self.state.borrow_mut();
        state.counters.total_calls += 1;
        if state.faults.bus_failure == Some(kind) {
            return Err(StationError::instrument(name, "bus failure: no response"));
        }
        Ok(state)
    }

    fn initialize(&self, kind: SimKind, name: &str) -> StationResult<bool> {
        let state = self.call(kind, name)?;
        Ok(!state.faults.refuse_init)
    }
}

fn reading(value: f64) -> ScaledValue {
    ScaledValue::new(value, READBACK_PRECISION)
}

/// Simulated line or auxiliary supply.
pub struct SimSupply {
    bench: SimBench,
    name: String,
    aux_index: Option<usize>,
}

impl SimSupply {
    const fn kind(&self) -> SimKind {
        if self.aux_index.is_some() {
            SimKind::AuxSupply
        } else {
            SimKind::LineSupply
        }
    }

    fn count_command(&self, state: &mut SimState) {
        if self.aux_index.is_some() {
            state.counters.aux_commands += 1;
        } else {
            state.counters.line_commands += 1;
        }
    }
}

impl Instrument for SimSupply {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&mut self) -> StationResult<bool> {
        self.bench.initialize(self.kind(), &self.name)
    }

    fn reset(&mut self) -> StationResult<bool> {
        self.bench.call(self.kind(), &self.name)?;
        Ok(true)
    }

    fn is_error(&mut self) -> StationResult<bool> {
        self.bench.call(self.kind(), &self.name)?;
        Ok(false)
    }

    fn what_error(&mut self) -> StationResult<String> {
        self.bench.call(self.kind(), &self.name)?;
        Ok("no error".to_string())
    }
}

impl PowerSupply for SimSupply {
    fn set_voltage(&mut self, volts: f64) -> StationResult<()> {
        let mut state = self.bench.call(self.kind(), &self.name)?;
        self.count_command(&mut state);
        match self.aux_index {
            Some(idx) => {
                if let Some(aux) = state.aux.get_mut(idx) {
                    aux.0 = volts;
                }
            }
            None => {
                state.line_volts = volts;
                state.line_setpoints.push(volts);
            }
        }
        Ok(())
    }

    fn set_current_limit(&mut self, amps: f64) -> StationResult<()> {
        let mut state = self.bench.call(self.kind(), &self.name)?;
        self.count_command(&mut state);
        if self.aux_index.is_none() {
            state.line_limit = amps;
        }
        Ok(())
    }

    fn set_output(&mut self, enabled: bool) -> StationResult<()> {
        let mut state = self.bench.call(self.kind(), &self.name)?;
        self.count_command(&mut state);
        match self.aux_index {
            Some(idx) => {
                if let Some(aux) = state.aux.get_mut(idx) {
                    aux.1 = enabled;
                }
            }
            None => {
                state.line_on = enabled;
                if !enabled {
                    state.latched_off.clear();
                }
            }
        }
        Ok(())
    }

    fn measure_voltage(&mut self) -> StationResult<ScaledValue> {
        let state = self.bench.call(self.kind(), &self.name)?;
        let volts = match self.aux_index {
            Some(idx) => state.aux.get(idx).filter(|a| a.1).map_or(0.0, |a| a.0),
            None if !state.line_on => 0.0,
            None if state.faults.bad_connection => state.line_volts * 0.5,
            None => state.line_volts,
        };
        Ok(reading(volts))
    }

    fn measure_current(&mut self) -> StationResult<ScaledValue> {
        let state = self.bench.call(self.kind(), &self.name)?;
        let amps = if self.aux_index.is_some() { 0.0 } else { state.input_amps() };
        Ok(reading(amps))
    }

    fn in_current_limit(&mut self) -> StationResult<bool> {
        let state = self.bench.call(self.kind(), &self.name)?;
        Ok(self.aux_index.is_none() && state.line_on && state.faults.overcurrent)
    }
}

/// Simulated DMM with a scanner on every DUT output.
pub struct SimDmm {
    bench: SimBench,
}

impl Instrument for SimDmm {
    fn name(&self) -> &str {
        "sim-dmm"
    }

    fn initialize(&mut self) -> StationResult<bool> {
        self.bench.initialize(SimKind::Dmm, "sim-dmm")
    }

    fn reset(&mut self) -> StationResult<bool> {
        self.bench.call(SimKind::Dmm, "sim-dmm")?;
        Ok(true)
    }

    fn is_error(&mut self) -> StationResult<bool> {
        self.bench.call(SimKind::Dmm, "sim-dmm")?;
        Ok(false)
    }

    fn what_error(&mut self) -> StationResult<String> {
        self.bench.call(SimKind::Dmm, "sim-dmm")?;
        Ok("no error".to_string())
    }
}

impl Dmm for SimDmm {
    fn measure(&mut self, function: DmmFunction, output: OutputChannel) -> StationResult<ScaledValue> {
        let mut state = self.bench.call(SimKind::Dmm, "sim-dmm")?;
        state.counters.dmm_reads += 1;
        let value = match function {
            DmmFunction::DcVolts => state.output_volts(output),
            DmmFunction::AcVolts => state.scope_reading(output, ScopeMeasurement::PeakToPeak) / (2.0 * std::f64::consts::SQRT_2),
        };
        Ok(reading(value))
    }
}

/// Simulated multi-channel electronic load.
pub struct SimLoadBank {
    bench: SimBench,
    channels: u8,
}

impl SimLoadBank {
    fn command(&self) -> StationResult<RefMut<'_, SimState>> {
        let mut state = self.bench.call(SimKind::Load, "sim-load")?;
        state.counters.load_commands += 1;
        Ok(state)
    }
}

impl Instrument for SimLoadBank {
    fn name(&self) -> &str {
        "sim-load"
    }

    fn initialize(&mut self) -> StationResult<bool> {
        self.bench.initialize(SimKind::Load, "sim-load")
    }

    fn reset(&mut self) -> StationResult<bool> {
        self.bench.call(SimKind::Load, "sim-load")?;
        Ok(true)
    }

    fn is_error(&mut self) -> StationResult<bool> {
        self.bench.call(SimKind::Load, "sim-load")?;
        Ok(false)
    }

    fn what_error(&mut self) -> StationResult<String> {
        self.bench.call(SimKind::Load, "sim-load")?;
        Ok("no error".to_string())
    }
}

impl ElectronicLoad for SimLoadBank {
    fn channels(&self) -> u8 {
        self.channels
    }

    fn set_mode(&mut self, channel: OutputChannel, mode: LoadMode) -> StationResult<()> {
        self.command()?.load_mut("sim-load", channel)?.mode = mode;
        Ok(())
    }

    fn set_level(&mut self, channel: OutputChannel, value: f64) -> StationResult<()> {
        self.command()?.load_mut("sim-load", channel)?.level = value;
        Ok(())
    }

    fn set_enabled(&mut self, channel: OutputChannel, enabled: bool) -> StationResult<()> {
        self.command()?.load_mut("sim-load", channel)?.enabled = enabled;
        Ok(())
    }

    fn set_short(&mut self, channel: OutputChannel, shorted: bool) -> StationResult<()> {
        let mut state = self.command()?;
        let releasing = {
            let load = state.load_mut("sim-load", channel)?;
            let releasing = load.shorted && !shorted;
            load.shorted = shorted;
            releasing
        };
        if releasing && state.faults.no_short_recovery {
            state.latched_off.insert(channel);
        }
        Ok(())
    }

    fn set_dynamic(&mut self, channel: OutputChannel, low: f64, _high: f64, _frequency_hz: f64) -> StationResult<()> {
        let mut state = self.command()?;
        let load = state.load_mut("sim-load", channel)?;
        load.level = low;
        load.dynamic = true;
        Ok(())
    }

    fn clear_dynamic(&mut self, channel: OutputChannel) -> StationResult<()> {
        self.command()?.load_mut("sim-load", channel)?.dynamic = false;
        Ok(())
    }

    fn measure_current(&mut self, channel: OutputChannel) -> StationResult<ScaledValue> {
        let state = self.bench.call(SimKind::Load, "sim-load")?;
        Ok(reading(state.drawn_amps(channel)))
    }
}

/// Simulated oscilloscope.
pub struct SimScope {
    bench: SimBench,
}

impl Instrument for SimScope {
    fn name(&self) -> &str {
        "sim-scope"
    }

    fn initialize(&mut self) -> StationResult<bool> {
        self.bench.initialize(SimKind::Scope, "sim-scope")
    }

    fn reset(&mut self) -> StationResult<bool> {
        let mut state = self.bench.call(SimKind::Scope, "sim-scope")?;
        state.scope_error = None;
        state.armed = false;
        Ok(true)
    }

    fn is_error(&mut self) -> StationResult<bool> {
        let state = self.bench.call(SimKind::Scope, "sim-scope")?;
        Ok(state.scope_error.is_some())
    }

    fn what_error(&mut self) -> StationResult<String> {
        let mut state = self.bench.call(SimKind::Scope, "sim-scope")?;
        Ok(state.scope_error.take().unwrap_or_else(|| "no error".to_string()))
    }
}

impl Oscilloscope for SimScope {
    fn set_bandwidth(&mut self, _channel: u8, _bandwidth: Bandwidth) -> StationResult<()> {
        self.bench.call(SimKind::Scope, "sim-scope")?;
        Ok(())
    }

    fn set_coupling(&mut self, _channel: u8, _coupling: Coupling) -> StationResult<()> {
        self.bench.call(SimKind::Scope, "sim-scope")?;
        Ok(())
    }

    fn set_vertical_scale(&mut self, channel: u8, volts_per_div: f64) -> StationResult<()> {
        let mut state = self.bench.call(SimKind::Scope, "sim-scope")?;
        state.scope_scale.insert(channel, volts_per_div);
        Ok(())
    }

    fn vertical_scale(&mut self, channel: u8) -> StationResult<f64> {
        let state = self.bench.call(SimKind::Scope, "sim-scope")?;
        Ok(state.scope_scale.get(&channel).copied().unwrap_or(1.0))
    }

    fn set_trigger(&mut self, trigger: Trigger) -> StationResult<()> {
        let mut state = self.bench.call(SimKind::Scope, "sim-scope")?;
        state.trigger = Some(trigger);
        Ok(())
    }

    fn arm(&mut self) -> StationResult<()> {
        let mut state = self.bench.call(SimKind::Scope, "sim-scope")?;
        state.armed = true;
        Ok(())
    }

    fn acquisition_complete(&mut self) -> StationResult<bool> {
        let state = self.bench.call(SimKind::Scope, "sim-scope")?;
        Ok(state.armed && !state.faults.stuck_acquisition && state.triggered())
    }

    fn measure(&mut self, channel: u8, kind: ScopeMeasurement) -> StationResult<ScaledValue> {
        let mut state = self.bench.call(SimKind::Scope, "sim-scope")?;
        state.counters.scope_measures += 1;
        if state.faults.scope_failures > 0 {
            state.faults.scope_failures -= 1;
            state.scope_error = Some("measurement error: no valid waveform".to_string());
        }
        Ok(reading(state.scope_reading(channel, kind)))
    }

    fn is_clipping(&mut self, _channel: u8) -> StationResult<bool> {
        let mut state = self.bench.call(SimKind::Scope, "sim-scope")?;
        if state.faults.clipping > 0 {
            state.faults.clipping -= 1;
            return Ok(true);
        }
        Ok(false)
    }

    fn rescale(&mut self, channel: u8) -> StationResult<()> {
        let mut state = self.bench.call(SimKind::Scope, "sim-scope")?;
        state.counters.scope_rescales += 1;
        if state.faults.rescale_fails {
            return Err(StationError::instrument("sim-scope", "autoscale rejected"));
        }
        let scale = state.scope_scale.get(&channel).copied().unwrap_or(1.0) * 2.0;
        state.scope_scale.insert(channel, scale);
        Ok(())
    }
}

/// Simulated relay matrix with the fixture inhibit line.
pub struct SimRelayMatrix {
    bench: SimBench,
}

impl Instrument for SimRelayMatrix {
    fn name(&self) -> &str {
        "sim-relays"
    }

    fn initialize(&mut self) -> StationResult<bool> {
        self.bench.initialize(SimKind::RelayMatrix, "sim-relays")
    }

    fn reset(&mut self) -> StationResult<bool> {
        let mut state = self.bench.call(SimKind::RelayMatrix, "sim-relays")?;
        state.relays.clear();
        Ok(true)
    }

    fn is_error(&mut self) -> StationResult<bool> {
        self.bench.call(SimKind::RelayMatrix, "sim-relays")?;
        Ok(false)
    }

    fn what_error(&mut self) -> StationResult<String> {
        self.bench.call(SimKind::RelayMatrix, "sim-relays")?;
        Ok("no error".to_string())
    }
}

impl RelayMatrix for SimRelayMatrix {
    fn apply(&mut self, closed: &BTreeSet<RelayId>) -> StationResult<()> {
        let mut state = self.bench.call(SimKind::RelayMatrix, "sim-relays")?;
        state.counters.relay_commands += 1;
        state.relays.clone_from(closed);
        Ok(())
    }

    fn set_inhibit(&mut self, asserted: bool) -> StationResult<()> {
        let mut state = self.bench.call(SimKind::RelayMatrix, "sim-relays")?;
        state.counters.relay_commands += 1;
        state.inhibit = asserted;
        Ok(())
    }
}

/// Simulated function generator on the DUT sync pin.
pub struct SimFunctionGenerator {
    bench: SimBench,
}

impl Instrument for SimFunctionGenerator {
    fn name(&self) -> &str {
        "sim-fgen"
    }

    fn initialize(&mut self) -> StationResult<bool> {
        self.bench.initialize(SimKind::FunctionGenerator, "sim-fgen")
    }

    fn reset(&mut self) -> StationResult<bool> {
        self.bench.call(SimKind::FunctionGenerator, "sim-fgen")?;
        Ok(true)
    }

    fn is_error(&mut self) -> StationResult<bool> {
        self.bench.call(SimKind::FunctionGenerator, "sim-fgen")?;
        Ok(false)
    }

    fn what_error(&mut self) -> StationResult<String> {
        self.bench.call(SimKind::FunctionGenerator, "sim-fgen")?;
        Ok("no error".to_string())
    }
}

impl FunctionGenerator for SimFunctionGenerator {
    fn set_square(&mut self, frequency_hz: f64, amplitude_volts: f64) -> StationResult<()> {
        let mut state = self.bench.call(SimKind::FunctionGenerator, "sim-fgen")?;
        state.counters.fgen_commands += 1;
        state.sync = Some((frequency_hz, amplitude_volts));
        Ok(())
    }

    fn set_output(&mut self, enabled: bool) -> StationResult<()> {
        let mut state = self.bench.call(SimKind::FunctionGenerator, "sim-fgen")?;
        state.counters.fgen_commands += 1;
        state.sync_on = enabled;
        Ok(())
    }
}

/// Simulated temperature chamber that settles instantly.
pub struct SimChamber {
    bench: SimBench,
}

impl Instrument for SimChamber {
    fn name(&self) -> &str {
        "sim-chamber"
    }

    fn initialize(&mut self) -> StationResult<bool> {
        self.bench.initialize(SimKind::Chamber, "sim-chamber")
    }

    fn reset(&mut self) -> StationResult<bool> {
        self.bench.call(SimKind::Chamber, "sim-chamber")?;
        Ok(true)
    }

    fn is_error(&mut self) -> StationResult<bool> {
        self.bench.call(SimKind::Chamber, "sim-chamber")?;
        Ok(false)
    }

    fn what_error(&mut self) -> StationResult<String> {
        self.bench.call(SimKind::Chamber, "sim-chamber")?;
        Ok("no error".to_string())
    }
}

impl TemperatureController for SimChamber {
    fn set_temperature(&mut self, celsius: f64) -> StationResult<()> {
        let mut state = self.bench.call(SimKind::Chamber, "sim-chamber")?;
        state.chamber_celsius = celsius;
        Ok(())
    }

    fn read_temperature(&mut self) -> StationResult<ScaledValue> {
        let state = self.bench.call(SimKind::Chamber, "sim-chamber")?;
        Ok(ScaledValue::new(state.chamber_celsius, 1))
    }

    fn at_setpoint(&mut self) -> StationResult<bool> {
        self.bench.call(SimKind::Chamber, "sim-chamber")?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn powered(bench: &SimBench) -> InstrumentRack {
        let mut rack = bench.rack();
        rack.line.set_voltage(48.0).unwrap();
        rack.line.set_output(true).unwrap();
        rack
    }

    #[test]
    fn test_output_follows_line_and_load() {
        let bench = SimBench::new();
        let mut rack = powered(&bench);

        let unloaded = rack.dmm.measure(DmmFunction::DcVolts, 1).unwrap().magnitude();
        assert!((unloaded - 5.0).abs() < 1e-9);

        rack.load.set_level(1, 2.0).unwrap();
        rack.load.set_enabled(1, true).unwrap();
        let loaded = rack.dmm.measure(DmmFunction::DcVolts, 1).unwrap().magnitude();
        assert!((loaded - (5.0 - 0.005 * 2.0)).abs() < 1e-9);

        rack.line.set_voltage(10.0).unwrap();
        let locked_out = rack.dmm.measure(DmmFunction::DcVolts, 1).unwrap().magnitude();
        assert!(locked_out.abs() < f64::EPSILON);
    }

    #[test]
    fn test_inhibit_and_reversed() {
        let bench = SimBench::new();
        let mut rack = powered(&bench);

        rack.relays.set_inhibit(true).unwrap();
        assert!(rack.dmm.measure(DmmFunction::DcVolts, 1).unwrap().magnitude().abs() < f64::EPSILON);
        rack.relays.set_inhibit(false).unwrap();

        bench.faults_mut().reversed = true;
        assert!(rack.dmm.measure(DmmFunction::DcVolts, 1).unwrap().magnitude() < 0.0);
    }

    #[test]
    fn test_bus_failure_and_counters() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        bench.faults_mut().bus_failure = Some(SimKind::Dmm);

        let err = rack.dmm.measure(DmmFunction::DcVolts, 1).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(bench.counters().total_calls, 1);
        assert_eq!(bench.counters().dmm_reads, 0);
    }

    #[test]
    fn test_scope_failure_sets_error_register() {
        let bench = SimBench::new();
        let mut rack = powered(&bench);
        bench.faults_mut().scope_failures = 1;

        rack.scope.measure(1, ScopeMeasurement::PeakToPeak).unwrap();
        assert!(rack.scope.is_error().unwrap());
        assert!(rack.scope.what_error().unwrap().contains("no valid waveform"));
        assert!(!rack.scope.is_error().unwrap());
    }

    #[test]
    fn test_short_without_recovery_latches() {
        let bench = SimBench::new();
        let mut rack = powered(&bench);
        bench.faults_mut().no_short_recovery = true;

        rack.load.set_enabled(1, true).unwrap();
        rack.load.set_short(1, true).unwrap();
        assert!((rack.load.measure_current(1).unwrap().magnitude() - 6.0).abs() < 1e-9);
        rack.load.set_short(1, false).unwrap();
        assert!(rack.dmm.measure(DmmFunction::DcVolts, 1).unwrap().magnitude().abs() < f64::EPSILON);
    }
}
