//! Measurement execution protocol.
//!
//! Wraps every strategy run in the same template: set up only what changed,
//! measure, rescale and retry a failed scope reading exactly once, restore
//! the scope, and flag the DUT if it faulted.

use tracing::{debug, instrument, warn};

use crate::domain::errors::{DutFault, StationError, StationResult};
use crate::domain::models::{ExtraMeasurement, Measured, ProtocolConfig, ScaledValue, Setpoint, TestStep};
use crate::domain::ports::{check_instrument, InstrumentRack};
use crate::services::measurement::{AppliedSetpoints, MeasureContext, Measurement};

/// Runs strategies against the rack and owns the state that spans steps:
/// the applied-setpoint cache and the DUT-error flag.
pub struct MeasurementProtocol {
    config: ProtocolConfig,
    applied: AppliedSetpoints,
    dut_error: bool,
}

impl MeasurementProtocol {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            config,
            applied: AppliedSetpoints::default(),
            dut_error: false,
        }
    }

    pub const fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub const fn applied(&self) -> &AppliedSetpoints {
        &self.applied
    }

    /// Whether a DUT fault has been detected during this sequence.
    pub const fn is_dut_error(&self) -> bool {
        self.dut_error
    }

    /// Forget every applied setpoint and clear the DUT-error flag.
    pub fn reset(&mut self) {
        self.applied.clear();
        self.dut_error = false;
    }

    /// Run one strategy for one step and return its raw reading in base SI
    /// units. See [`finalize`] for the step-facing value.
    ///
    /// Once the DUT-error flag is set this returns the bad-measurement
    /// sentinel without touching any instrument.
    #[instrument(skip_all, fields(test = step.display_name(), index = step.index(), output = step.output()))]
    pub fn execute(
        &mut self,
        rack: &mut InstrumentRack,
        strategy: &dyn Measurement,
        step: &TestStep,
    ) -> StationResult<Measured> {
        if self.dut_error {
            debug!("DUT error flagged earlier, not touching hardware");
            return Ok(Measured::bad(strategy.name()));
        }

        let result = {
            let mut ctx = MeasureContext::new(&self.config, &mut self.applied);
            let result = Self::setup_and_measure(&mut ctx, rack, strategy, step);
            let restored = Self::post_measurement(&ctx, rack);
            match (result, restored) {
                (Ok(measured), Ok(())) => Ok(measured),
                (Ok(_), Err(err)) => Err(err),
                (Err(err), Err(post)) => {
                    warn!(error = %post, "scope restore failed after a failed measurement");
                    Err(err)
                }
                (Err(err), Ok(())) => Err(err),
            }
        };

        if let Err(err) = &result {
            if let Some(fault) = err.dut_fault() {
                warn!(%fault, "DUT fault detected; remaining steps will report bad measurements");
                self.dut_error = true;
            }
        }
        result
    }

    fn setup_and_measure(
        ctx: &mut MeasureContext<'_>,
        rack: &mut InstrumentRack,
        strategy: &dyn Measurement,
        step: &TestStep,
    ) -> StationResult<Measured> {
        Self::pre_measurement(ctx, rack, strategy, step)?;

        match strategy.measure(rack, step, ctx) {
            Err(StationError::ScopeMeasure { channel, reason }) if strategy.uses_scope() => {
                warn!(channel, %reason, "scope measurement failed, rescaling and retrying once");
                rack.scope
                    .rescale(channel)
                    .and_then(|()| check_instrument(rack.scope.as_mut()))
                    .map_err(|err| StationError::RescaleFailed {
                        channel,
                        reason: err.to_string(),
                    })?;
                strategy.measure(rack, step, ctx)
            }
            other => other,
        }
    }

    /// Push every axis the strategy needs, skipping unchanged setpoints.
    fn pre_measurement(
        ctx: &mut MeasureContext<'_>,
        rack: &mut InstrumentRack,
        strategy: &dyn Measurement,
        step: &TestStep,
    ) -> StationResult<()> {
        let axes = strategy.axes();
        let conditions = step.conditions();

        if axes.temperature {
            if let Some(celsius) = conditions.temperature {
                ctx.soak(rack, celsius)?;
            }
        }
        if axes.relays {
            ctx.apply_relays(rack, &conditions.relays_pre)?;
        }
        if axes.inhibit {
            ctx.set_inhibit(rack, conditions.inhibit)?;
        }
        if axes.aux {
            let channels = rack.aux.len().max(conditions.aux.len());
            for index in 0..channels {
                let setpoint = conditions.aux.get(index).copied().unwrap_or_default();
                let target = match setpoint {
                    Setpoint::Volts(volts) => Some(volts),
                    Setpoint::Undefined if index < rack.aux.len() => {
                        ctx.config().aux_defaults.get(index).copied()
                    }
                    Setpoint::Undefined => None,
                };
                if let Some(volts) = target {
                    ctx.set_aux(rack, index, volts)?;
                }
            }
        }
        if axes.line {
            let limit = ctx.config().line_current_limit_amps;
            ctx.set_line_limit(rack, limit)?;
            ctx.set_line(rack, conditions.line.volts, strategy.ramps_line())?;
            ctx.set_line_output(rack, true)?;
        }
        if axes.loads {
            for load in &conditions.loads {
                ctx.set_load(rack, load.channel, load.mode, load.value)?;
            }
            for channel in 1..=rack.load.channels() {
                if conditions.load(channel).is_none() {
                    ctx.disable_load(rack, channel)?;
                }
            }
            check_instrument(rack.load.as_mut())?;
        }
        if axes.short {
            ctx.set_short(rack, step.output(), conditions.short)?;
        }
        if axes.sync {
            ctx.set_sync(rack, conditions.sync)?;
        }
        if axes.relays && !conditions.relays_mid.is_empty() {
            let closed = conditions.relays_pre.union(&conditions.relays_mid).copied().collect();
            ctx.apply_relays(rack, &closed)?;
        }
        if axes.line && rack.line.in_current_limit()? {
            return Err(DutFault::Overcurrent { output: step.output() }.into());
        }

        debug!(strategy = strategy.name(), "setup applied");
        Ok(())
    }

    /// Restore the default vertical scale on every scope channel used.
    /// Nothing else is reset; instruments keep their last commanded state.
    fn post_measurement(ctx: &MeasureContext<'_>, rack: &mut InstrumentRack) -> StationResult<()> {
        if ctx.scope_channels().is_empty() {
            return Ok(());
        }
        ctx.restore_scope(rack.scope.as_mut())?;
        check_instrument(rack.scope.as_mut())
    }
}

/// Convert a raw reading into the step's units at the step's comparison
/// precision. Supporting values after the first are left as measured.
pub fn finalize(step: &TestStep, raw: &Measured) -> Measured {
    let factor = step.units().base_factor();
    let precision = step.limits().comparison_precision();
    let convert = |value: ScaledValue| value.rescaled(factor).with_precision(precision);

    let mut values = raw.values.clone();
    match values.first_mut() {
        Some(primary) => *primary = convert(*primary),
        None => values.push(ScaledValue::bad_measurement().with_precision(precision)),
    }

    Measured {
        name: raw.name.clone(),
        values,
        extras: raw
            .extras
            .iter()
            .map(|extra| ExtraMeasurement {
                value: convert(extra.value),
                ..extra.clone()
            })
            .collect(),
    }
}
