//! Instrument access shared by the protocol and every strategy.
//!
//! All setpoint changes go through [`MeasureContext`] so the
//! [`AppliedSetpoints`] cache always mirrors what was last commanded, and a
//! setpoint is only sent when it differs from that record.

use std::collections::{BTreeMap, BTreeSet};
use std::thread;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::domain::errors::{StationError, StationResult};
use crate::domain::models::{Bandwidth, LoadMode, OutputChannel, ProtocolConfig, RelayId, ScaledValue, SyncSignal};
use crate::domain::ports::{check_instrument, Coupling, InstrumentRack, Oscilloscope, ScopeMeasurement};

const SETPOINT_TOLERANCE: f64 = 1e-9;

/// Hard bound on line ramp increments.
const MAX_RAMP_STEPS: u32 = 10_000;

fn differs(last: Option<f64>, target: f64) -> bool {
    last.is_none_or(|v| (v - target).abs() > SETPOINT_TOLERANCE)
}

/// Last commanded state of one load channel.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoadState {
    pub mode: Option<LoadMode>,
    pub level: Option<f64>,
    pub enabled: bool,
    pub shorted: bool,
}

/// Everything last commanded to the rack during this sequence.
///
/// `None` means "unknown", which forces the next command out.
#[derive(Debug, Clone, Default)]
pub struct AppliedSetpoints {
    pub line_volts: Option<f64>,
    pub line_enabled: Option<bool>,
    pub line_limit: Option<f64>,
    pub loads: BTreeMap<OutputChannel, LoadState>,
    pub aux_volts: BTreeMap<usize, f64>,
    pub aux_enabled: BTreeSet<usize>,
    pub relays: Option<BTreeSet<RelayId>>,
    pub inhibit: Option<bool>,
    pub sync: Option<Option<SyncSignal>>,
    pub bandwidth: BTreeMap<u8, Bandwidth>,
    pub coupling: BTreeMap<u8, Coupling>,
    pub temperature: Option<f64>,
}

impl AppliedSetpoints {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Per-measurement view of the protocol state handed to strategies.
pub struct MeasureContext<'a> {
    config: &'a ProtocolConfig,
    applied: &'a mut AppliedSetpoints,
    scope_channels: BTreeSet<u8>,
}

impl<'a> MeasureContext<'a> {
    pub fn new(config: &'a ProtocolConfig, applied: &'a mut AppliedSetpoints) -> Self {
        Self {
            config,
            applied,
            scope_channels: BTreeSet::new(),
        }
    }

    pub const fn config(&self) -> &ProtocolConfig {
        self.config
    }

    /// Scope channels measured during this context's lifetime.
    pub const fn scope_channels(&self) -> &BTreeSet<u8> {
        &self.scope_channels
    }

    pub fn settle(ms: u64) {
        if ms > 0 {
            thread::sleep(Duration::from_millis(ms));
        }
    }

    // ---- line -------------------------------------------------------------

    pub fn set_line_limit(&mut self, rack: &mut InstrumentRack, amps: f64) -> StationResult<()> {
        if differs(self.applied.line_limit, amps) {
            rack.line.set_current_limit(amps)?;
            self.applied.line_limit = Some(amps);
        }
        Ok(())
    }

    /// Drive the line supply to `volts`, stepping from the last applied
    /// voltage when `ramp` is set.
    pub fn set_line(&mut self, rack: &mut InstrumentRack, volts: f64, ramp: bool) -> StationResult<()> {
        if !differs(self.applied.line_volts, volts) {
            return Ok(());
        }
        if ramp {
            self.ramp_line(rack, volts)?;
        } else {
            rack.line.set_voltage(volts)?;
        }
        self.applied.line_volts = Some(volts);
        check_instrument(rack.line.as_mut())
    }

    fn ramp_line(&mut self, rack: &mut InstrumentRack, target: f64) -> StationResult<()> {
        let step = self.config.line_ramp_step_volts;
        if step <= 0.0 || !step.is_finite() {
            return Err(StationError::Config(format!("line ramp step must be positive, got {step}")));
        }
        let mut current = self.applied.line_volts.unwrap_or(0.0);
        let direction: f64 = if target >= current { 1.0 } else { -1.0 };
        let mut steps = 0;

        debug!(from = current, to = target, step, "ramping line");
        while (target - current).abs() > SETPOINT_TOLERANCE {
            steps += 1;
            if steps > MAX_RAMP_STEPS {
                return Err(StationError::InfiniteLoop {
                    what: "line ramp".to_string(),
                    iterations: MAX_RAMP_STEPS,
                });
            }
            current = if (target - current).abs() <= step {
                target
            } else {
                direction.mul_add(step, current)
            };
            rack.line.set_voltage(current)?;
            self.applied.line_volts = Some(current);
            Self::settle(self.config.line_ramp_settle_ms);
        }
        Ok(())
    }

    pub fn set_line_output(&mut self, rack: &mut InstrumentRack, enabled: bool) -> StationResult<()> {
        if self.applied.line_enabled != Some(enabled) {
            rack.line.set_output(enabled)?;
            self.applied.line_enabled = Some(enabled);
        }
        Ok(())
    }

    // ---- loads ------------------------------------------------------------

    fn check_load_channel(rack: &InstrumentRack, channel: OutputChannel) -> StationResult<()> {
        if channel == 0 || channel > rack.load.channels() {
            return Err(StationError::Config(format!(
                "load channel {channel} does not exist (load has {} channels)",
                rack.load.channels()
            )));
        }
        Ok(())
    }

    pub fn set_load(
        &mut self,
        rack: &mut InstrumentRack,
        channel: OutputChannel,
        mode: LoadMode,
        value: f64,
    ) -> StationResult<()> {
        Self::check_load_channel(rack, channel)?;
        let state = self.applied.loads.entry(channel).or_default();
        if state.mode != Some(mode) {
            rack.load.set_mode(channel, mode)?;
            state.mode = Some(mode);
        }
        if differs(state.level, value) {
            rack.load.set_level(channel, value)?;
            state.level = Some(value);
        }
        if !state.enabled {
            rack.load.set_enabled(channel, true)?;
            state.enabled = true;
        }
        Ok(())
    }

    pub fn disable_load(&mut self, rack: &mut InstrumentRack, channel: OutputChannel) -> StationResult<()> {
        if let Some(state) = self.applied.loads.get_mut(&channel) {
            if state.enabled {
                rack.load.set_enabled(channel, false)?;
                state.enabled = false;
            }
        }
        Ok(())
    }

    pub fn set_short(&mut self, rack: &mut InstrumentRack, channel: OutputChannel, shorted: bool) -> StationResult<()> {
        if !shorted && !self.applied.loads.get(&channel).is_some_and(|s| s.shorted) {
            return Ok(());
        }
        Self::check_load_channel(rack, channel)?;
        let state = self.applied.loads.entry(channel).or_default();
        if state.shorted != shorted {
            rack.load.set_short(channel, shorted)?;
            state.shorted = shorted;
        }
        Ok(())
    }

    /// Current level of a load channel as last commanded.
    pub fn load_level(&self, channel: OutputChannel) -> Option<f64> {
        self.applied.loads.get(&channel).and_then(|s| s.level)
    }

    // ---- auxiliary supplies -----------------------------------------------

    pub fn set_aux(&mut self, rack: &mut InstrumentRack, index: usize, volts: f64) -> StationResult<()> {
        let Some(supply) = rack.aux.get_mut(index) else {
            return Err(StationError::Config(format!(
                "auxiliary supply {index} is not fitted ({} configured)",
                rack.aux.len()
            )));
        };
        if differs(self.applied.aux_volts.get(&index).copied(), volts) {
            supply.set_voltage(volts)?;
            self.applied.aux_volts.insert(index, volts);
        }
        if !self.applied.aux_enabled.contains(&index) {
            supply.set_output(true)?;
            self.applied.aux_enabled.insert(index);
        }
        check_instrument(supply.as_mut())
    }

    // ---- relays, inhibit, sync --------------------------------------------

    pub fn apply_relays(&mut self, rack: &mut InstrumentRack, closed: &BTreeSet<RelayId>) -> StationResult<()> {
        if self.applied.relays.as_ref() == Some(closed) {
            return Ok(());
        }
        rack.relays.apply(closed)?;
        self.applied.relays = Some(closed.clone());
        check_instrument(rack.relays.as_mut())?;
        Self::settle(self.config.relay_settle_ms);
        Ok(())
    }

    pub fn set_inhibit(&mut self, rack: &mut InstrumentRack, asserted: bool) -> StationResult<()> {
        if self.applied.inhibit != Some(asserted) {
            rack.relays.set_inhibit(asserted)?;
            self.applied.inhibit = Some(asserted);
            Self::settle(self.config.relay_settle_ms);
        }
        Ok(())
    }

    pub fn set_sync(&mut self, rack: &mut InstrumentRack, sync: Option<SyncSignal>) -> StationResult<()> {
        if self.applied.sync == Some(sync) {
            return Ok(());
        }
        match sync {
            Some(signal) => {
                rack.fgen.set_square(signal.frequency_hz, signal.amplitude_volts)?;
                rack.fgen.set_output(true)?;
            }
            None => rack.fgen.set_output(false)?,
        }
        self.applied.sync = Some(sync);
        check_instrument(rack.fgen.as_mut())
    }

    // ---- temperature ------------------------------------------------------

    /// Set the chamber and wait until it reports the setpoint.
    pub fn soak(&mut self, rack: &mut InstrumentRack, celsius: f64) -> StationResult<()> {
        let Some(chamber) = rack.chamber.as_mut() else {
            return Err(StationError::Config(
                "step sets TEMPERATURE but no temperature controller is configured".to_string(),
            ));
        };
        if !differs(self.applied.temperature, celsius) {
            return Ok(());
        }
        chamber.set_temperature(celsius)?;
        self.applied.temperature = Some(celsius);

        for _ in 0..self.config.max_soak_polls {
            if chamber.at_setpoint()? {
                debug!(celsius, "chamber at setpoint");
                return Ok(());
            }
            Self::settle(self.config.soak_poll_ms);
        }
        Err(StationError::InfiniteLoop {
            what: format!("chamber to reach {celsius} C"),
            iterations: self.config.max_soak_polls,
        })
    }

    // ---- oscilloscope -----------------------------------------------------

    pub fn configure_scope(
        &mut self,
        scope: &mut dyn Oscilloscope,
        channel: u8,
        bandwidth: Bandwidth,
        coupling: Coupling,
    ) -> StationResult<()> {
        if self.applied.bandwidth.get(&channel) != Some(&bandwidth) {
            scope.set_bandwidth(channel, bandwidth)?;
            self.applied.bandwidth.insert(channel, bandwidth);
        }
        if self.applied.coupling.get(&channel) != Some(&coupling) {
            scope.set_coupling(channel, coupling)?;
            self.applied.coupling.insert(channel, coupling);
        }
        self.scope_channels.insert(channel);
        Ok(())
    }

    /// Poll for acquisition completion, bounded by the configured count.
    pub fn wait_for_acquisition(&self, scope: &mut dyn Oscilloscope) -> StationResult<()> {
        for poll in 0..self.config.max_acquisition_polls {
            if scope.acquisition_complete()? {
                trace!(poll, "acquisition complete");
                return Ok(());
            }
            Self::settle(self.config.acquisition_poll_ms);
        }
        Err(StationError::MeasurementTimeout(format!(
            "{} never completed an acquisition after {} polls",
            scope.name(),
            self.config.max_acquisition_polls
        )))
    }

    /// Arm, wait for the acquisition, then read one measurement.
    pub fn scope_measure(
        &mut self,
        scope: &mut dyn Oscilloscope,
        channel: u8,
        kind: ScopeMeasurement,
    ) -> StationResult<ScaledValue> {
        scope.arm()?;
        self.wait_for_acquisition(scope)?;
        self.read_scope(scope, channel, kind)
    }

    /// Read a measurement from a completed acquisition.
    ///
    /// The error register is read right after the measurement and again
    /// after the settle delay, since some scopes flag completion before the
    /// register updates. Errors and clipping become `ScopeMeasure`.
    pub fn read_scope(
        &mut self,
        scope: &mut dyn Oscilloscope,
        channel: u8,
        kind: ScopeMeasurement,
    ) -> StationResult<ScaledValue> {
        self.scope_channels.insert(channel);
        let value = scope.measure(channel, kind)?;

        Self::check_scope_error(scope, channel)?;
        Self::settle(self.config.scope_error_settle_ms);
        Self::check_scope_error(scope, channel)?;

        if scope.is_clipping(channel)? {
            return Err(StationError::ScopeMeasure {
                channel,
                reason: "signal clipped".to_string(),
            });
        }
        if !value.magnitude().is_finite() {
            return Err(StationError::ScopeMeasure {
                channel,
                reason: format!("{kind:?} returned no value"),
            });
        }
        Ok(value)
    }

    fn check_scope_error(scope: &mut dyn Oscilloscope, channel: u8) -> StationResult<()> {
        if scope.is_error()? {
            let reason = scope.what_error()?;
            warn!(channel, %reason, "scope reported measurement error");
            return Err(StationError::ScopeMeasure { channel, reason });
        }
        Ok(())
    }

    /// Put every scope channel touched back on the default vertical scale.
    pub fn restore_scope(&self, scope: &mut dyn Oscilloscope) -> StationResult<()> {
        for &channel in &self.scope_channels {
            scope.set_vertical_scale(channel, self.config.default_scope_scale_volts)?;
        }
        Ok(())
    }
}
