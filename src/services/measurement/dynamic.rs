//! Oscilloscope measurements. The scope channel is the DUT output number.

use super::{require_next_load, MeasureContext, Measurement};
use crate::domain::errors::{DutFault, StationError, StationResult};
use crate::domain::models::{Measured, ScaledValue, TestStep};
use crate::domain::ports::{
    check_instrument, Coupling, DmmFunction, InstrumentRack, ScopeMeasurement, Trigger, TriggerMode,
};

/// Load switching rate for transient response.
const TRANSIENT_RATE_HZ: f64 = 100.0;

/// Trigger level for turn-on captures.
const TURN_ON_TRIGGER_VOLTS: f64 = 0.1;

/// Output below this after a missed turn-on trigger means the DUT never started.
const NO_OUTPUT_VOLTS: f64 = 0.05;

fn prepare_scope(
    rack: &mut InstrumentRack,
    step: &TestStep,
    ctx: &mut MeasureContext<'_>,
    coupling: Coupling,
    mode: TriggerMode,
) -> StationResult<u8> {
    let channel = step.output();
    ctx.configure_scope(rack.scope.as_mut(), channel, step.conditions().bandwidth, coupling)?;
    rack.scope.set_trigger(Trigger {
        source: channel,
        level_volts: 0.0,
        mode,
        rising: true,
    })?;
    check_instrument(rack.scope.as_mut())?;
    Ok(channel)
}

/// `RIPPLE`: AC-coupled peak-to-peak output ripple.
pub struct RippleMeasurement;

impl Measurement for RippleMeasurement {
    fn name(&self) -> &'static str {
        "RIPPLE"
    }

    fn uses_scope(&self) -> bool {
        true
    }

    fn measure(&self, rack: &mut InstrumentRack, step: &TestStep, ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let channel = prepare_scope(rack, step, ctx, Coupling::Ac, TriggerMode::Auto)?;
        let value = ctx.scope_measure(rack.scope.as_mut(), channel, ScopeMeasurement::PeakToPeak)?;
        Ok(Measured::single(self.name(), value))
    }
}

/// `FREQUENCY`: switching frequency seen on the output.
pub struct FrequencyMeasurement;

impl Measurement for FrequencyMeasurement {
    fn name(&self) -> &'static str {
        "FREQUENCY"
    }

    fn uses_scope(&self) -> bool {
        true
    }

    fn measure(&self, rack: &mut InstrumentRack, step: &TestStep, ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let channel = prepare_scope(rack, step, ctx, Coupling::Ac, TriggerMode::Auto)?;
        let value = ctx.scope_measure(rack.scope.as_mut(), channel, ScopeMeasurement::Frequency)?;
        Ok(Measured::single(self.name(), value))
    }
}

/// `LOADTRANSIENTRESPONSE`: peak-to-peak output excursion while the load
/// switches between `LOAD` and `LOAD_NEXT`.
pub struct LoadTransientMeasurement;

impl Measurement for LoadTransientMeasurement {
    fn name(&self) -> &'static str {
        "LOADTRANSIENTRESPONSE"
    }

    fn uses_scope(&self) -> bool {
        true
    }

    fn validate(&self, step: &TestStep) -> StationResult<()> {
        require_next_load(self.name(), step, step.output()).map(|_| ())
    }

    fn measure(&self, rack: &mut InstrumentRack, step: &TestStep, ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let output = step.output();
        let (low, high) = require_next_load(self.name(), step, output)?;
        let channel = prepare_scope(rack, step, ctx, Coupling::Ac, TriggerMode::Normal)?;

        rack.load.set_dynamic(output, low, high, TRANSIENT_RATE_HZ)?;
        let value = ctx.scope_measure(rack.scope.as_mut(), channel, ScopeMeasurement::PeakToPeak);
        rack.load.clear_dynamic(output)?;
        check_instrument(rack.load.as_mut())?;

        Ok(Measured::single(self.name(), value?))
    }
}

/// Power the line up with a single-shot trigger armed and read `kind`.
fn capture_turn_on(
    rack: &mut InstrumentRack,
    step: &TestStep,
    ctx: &mut MeasureContext<'_>,
    kind: ScopeMeasurement,
) -> StationResult<ScaledValue> {
    let channel = step.output();
    ctx.configure_scope(rack.scope.as_mut(), channel, step.conditions().bandwidth, Coupling::Dc)?;

    ctx.set_line_output(rack, false)?;
    MeasureContext::settle(ctx.config().relay_settle_ms);

    rack.scope.set_trigger(Trigger {
        source: channel,
        level_volts: TURN_ON_TRIGGER_VOLTS,
        mode: TriggerMode::Single,
        rising: true,
    })?;
    rack.scope.arm()?;
    ctx.set_line_output(rack, true)?;

    match ctx.wait_for_acquisition(rack.scope.as_mut()) {
        Ok(()) => ctx.read_scope(rack.scope.as_mut(), channel, kind),
        Err(timeout @ StationError::MeasurementTimeout(_)) => {
            let volts = rack.dmm.measure(DmmFunction::DcVolts, channel)?.magnitude();
            if volts.abs() < NO_OUTPUT_VOLTS {
                Err(DutFault::NoOutput { output: channel }.into())
            } else {
                Err(timeout)
            }
        }
        Err(other) => Err(other),
    }
}

/// `TURNONDELAY`: time from line enable to the output crossing the trigger level.
pub struct TurnOnDelayMeasurement;

impl Measurement for TurnOnDelayMeasurement {
    fn name(&self) -> &'static str {
        "TURNONDELAY"
    }

    fn uses_scope(&self) -> bool {
        true
    }

    fn measure(&self, rack: &mut InstrumentRack, step: &TestStep, ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let value = capture_turn_on(rack, step, ctx, ScopeMeasurement::Delay)?;
        Ok(Measured::single(self.name(), value))
    }
}

/// `RISETIME`: output 10-90 % rise time at turn-on.
pub struct RiseTimeMeasurement;

impl Measurement for RiseTimeMeasurement {
    fn name(&self) -> &'static str {
        "RISETIME"
    }

    fn uses_scope(&self) -> bool {
        true
    }

    fn measure(&self, rack: &mut InstrumentRack, step: &TestStep, ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let value = capture_turn_on(rack, step, ctx, ScopeMeasurement::RiseTime)?;
        Ok(Measured::single(self.name(), value))
    }
}
