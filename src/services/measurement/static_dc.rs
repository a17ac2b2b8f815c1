//! DC measurements taken with the DMM and the supplies' own readback.

use tracing::debug;

use super::{Axes, MeasureContext, Measurement};
use crate::domain::errors::{DutFault, StationError, StationResult};
use crate::domain::models::{Measured, ScaledValue, TestStep};
use crate::domain::ports::{check_instrument, DmmFunction, InstrumentRack};

/// Output voltage above which an inhibited DUT counts as still running.
const INHIBIT_RESIDUAL_VOLTS: f64 = 0.5;

/// Fraction of the pre-short output a DUT must return to once released.
const SHORT_RECOVERY_FRACTION: f64 = 0.9;

fn output_volts(rack: &mut InstrumentRack, output: u8) -> StationResult<ScaledValue> {
    let value = rack.dmm.measure(DmmFunction::DcVolts, output)?;
    check_instrument(rack.dmm.as_mut())?;
    Ok(value)
}

fn input_volts_amps(rack: &mut InstrumentRack) -> StationResult<(f64, f64)> {
    let volts = rack.line.measure_voltage()?.magnitude();
    let amps = rack.line.measure_current()?.magnitude();
    check_instrument(rack.line.as_mut())?;
    Ok((volts, amps))
}

/// `VOUTDC`: DC output voltage.
pub struct OutputVoltageMeasurement;

impl Measurement for OutputVoltageMeasurement {
    fn name(&self) -> &'static str {
        "VOUTDC"
    }

    fn measure(&self, rack: &mut InstrumentRack, step: &TestStep, _ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let value = output_volts(rack, step.output())?;
        Ok(Measured::single(self.name(), value))
    }
}

/// `IIN`: input line current.
pub struct InputCurrentMeasurement;

impl Measurement for InputCurrentMeasurement {
    fn name(&self) -> &'static str {
        "IIN"
    }

    fn measure(&self, rack: &mut InstrumentRack, _step: &TestStep, _ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let value = rack.line.measure_current()?;
        check_instrument(rack.line.as_mut())?;
        Ok(Measured::single(self.name(), value))
    }
}

/// `INPUTPOWER`: line voltage times line current.
pub struct InputPowerMeasurement;

impl Measurement for InputPowerMeasurement {
    fn name(&self) -> &'static str {
        "INPUTPOWER"
    }

    fn measure(&self, rack: &mut InstrumentRack, _step: &TestStep, _ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let (volts, amps) = input_volts_amps(rack)?;
        Ok(Measured {
            name: self.name().to_string(),
            values: vec![
                ScaledValue::new(volts * amps, 6),
                ScaledValue::new(volts, 6),
                ScaledValue::new(amps, 6),
            ],
            extras: Vec::new(),
        })
    }
}

/// `EFFICIENCY`: total output power over input power, in percent.
///
/// Output power is summed over every loaded channel.
pub struct EfficiencyMeasurement;

impl Measurement for EfficiencyMeasurement {
    fn name(&self) -> &'static str {
        "EFFICIENCY"
    }

    fn validate(&self, step: &TestStep) -> StationResult<()> {
        if step.conditions().loads.is_empty() {
            return Err(StationError::FileError(format!(
                "EFFICIENCY test '{}' has no LOAD",
                step.display_name()
            )));
        }
        Ok(())
    }

    fn measure(&self, rack: &mut InstrumentRack, step: &TestStep, _ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let mut output_power = 0.0;
        for load in &step.conditions().loads {
            let volts = output_volts(rack, load.channel)?.magnitude();
            let amps = rack.load.measure_current(load.channel)?.magnitude();
            output_power += volts * amps;
        }
        check_instrument(rack.load.as_mut())?;

        let (volts, amps) = input_volts_amps(rack)?;
        let input_power = volts * amps;
        if input_power <= 0.0 {
            return Err(StationError::Measurement(format!(
                "input power is {input_power:.3} W, efficiency is undefined"
            )));
        }

        let efficiency = output_power / input_power * 100.0;
        debug!(output_power, input_power, efficiency, "efficiency measured");
        Ok(Measured {
            name: self.name().to_string(),
            values: vec![
                ScaledValue::bounded(efficiency, 6, 0.0, 100.0),
                ScaledValue::new(input_power, 6),
                ScaledValue::new(output_power, 6),
            ],
            extras: Vec::new(),
        })
    }
}

/// `INHIBITCURRENT`: input current with the DUT inhibited.
pub struct InhibitCurrentMeasurement;

impl Measurement for InhibitCurrentMeasurement {
    fn name(&self) -> &'static str {
        "INHIBITCURRENT"
    }

    fn validate(&self, step: &TestStep) -> StationResult<()> {
        if !step.conditions().inhibit {
            return Err(StationError::FileError(format!(
                "INHIBITCURRENT test '{}' must set INHIBIT",
                step.display_name()
            )));
        }
        Ok(())
    }

    fn measure(&self, rack: &mut InstrumentRack, step: &TestStep, _ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let residual = output_volts(rack, step.output())?;
        if residual.magnitude().abs() > INHIBIT_RESIDUAL_VOLTS {
            return Err(DutFault::InhibitFailure { output: step.output() }.into());
        }
        let current = rack.line.measure_current()?;
        check_instrument(rack.line.as_mut())?;
        Ok(Measured {
            name: self.name().to_string(),
            values: vec![current, residual],
            extras: Vec::new(),
        })
    }
}

/// `SHORTCIRCUITCURRENT`: load current with the output shorted.
///
/// Drives the short itself and checks the output comes back afterwards, so
/// it never reuses an earlier reading.
pub struct ShortCircuitCurrentMeasurement;

impl Measurement for ShortCircuitCurrentMeasurement {
    fn name(&self) -> &'static str {
        "SHORTCIRCUITCURRENT"
    }

    fn axes(&self) -> Axes {
        Axes::WITHOUT_SHORT
    }

    fn supports_speedup(&self) -> bool {
        false
    }

    fn measure(&self, rack: &mut InstrumentRack, step: &TestStep, ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let output = step.output();
        let before = output_volts(rack, output)?.magnitude();

        ctx.set_short(rack, output, true)?;
        MeasureContext::settle(ctx.config().relay_settle_ms);
        let current = rack.load.measure_current(output);
        ctx.set_short(rack, output, false)?;
        let current = current?;
        check_instrument(rack.load.as_mut())?;

        MeasureContext::settle(ctx.config().relay_settle_ms);
        let after = output_volts(rack, output)?.magnitude();
        if after.abs() < (before * SHORT_RECOVERY_FRACTION).abs() {
            return Err(DutFault::NoShortRecovery { output }.into());
        }

        Ok(Measured {
            name: self.name().to_string(),
            values: vec![current, ScaledValue::new(after, 6)],
            extras: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::instruments::SimBench;
    use crate::domain::models::{Conditions, Limits, ProtocolConfig, Units};
    use crate::services::protocol::MeasurementProtocol;

    fn step(name: &str, output: u8, conditions: Conditions) -> TestStep {
        TestStep::new(0, name, output, conditions, Limits::parse("0", "100").unwrap(), Units::Volts)
    }

    fn measure(bench: &SimBench, strategy: &dyn Measurement, step: &TestStep) -> StationResult<Measured> {
        let mut rack = bench.rack();
        let mut protocol = MeasurementProtocol::new(ProtocolConfig::immediate());
        protocol.execute(&mut rack, strategy, step)
    }

    /// Input current of the default DUT at 48 V with 2 A on output 1.
    fn loaded_input_amps() -> f64 {
        4.99 * 2.0 / (0.9 * 48.0) + 0.05
    }

    #[test]
    fn test_output_voltage_on_second_output() {
        let bench = SimBench::new();
        let step = step("VOUTDC", 2, Conditions::new(48.0).with_load(1, 2.0).with_load(2, 1.0));

        let measured = measure(&bench, &OutputVoltageMeasurement, &step).unwrap();
        let expected = 12.0 - 0.005 * 1.0 - 0.001 * 2.0;
        assert!((measured.primary().magnitude() - expected).abs() < 1e-9);
    }

    #[test]
    fn test_input_current_and_power() {
        let bench = SimBench::new();
        let conditions = Conditions::new(48.0).with_load(1, 2.0);

        let current = measure(&bench, &InputCurrentMeasurement, &step("IIN", 1, conditions.clone())).unwrap();
        assert!((current.primary().magnitude() - loaded_input_amps()).abs() < 1e-9);

        let power = measure(&bench, &InputPowerMeasurement, &step("INPUTPOWER", 1, conditions)).unwrap();
        assert!((power.primary().magnitude() - 48.0 * loaded_input_amps()).abs() < 1e-6);
        assert!((power.values[1].magnitude() - 48.0).abs() < 1e-9);
        assert_eq!(power.values.len(), 3);
    }

    #[test]
    fn test_efficiency() {
        let bench = SimBench::new();
        let step = step("EFFICIENCY", 1, Conditions::new(48.0).with_load(1, 2.0));

        let measured = measure(&bench, &EfficiencyMeasurement, &step).unwrap();
        let expected = 4.99 * 2.0 / (48.0 * loaded_input_amps()) * 100.0;
        assert!((measured.primary().magnitude() - expected).abs() < 1e-6);
        assert!(measured.primary().magnitude() < 90.0);

        let unloaded = self::step("EFFICIENCY", 1, Conditions::new(48.0));
        assert!(matches!(
            EfficiencyMeasurement.validate(&unloaded),
            Err(StationError::FileError(_))
        ));
    }

    #[test]
    fn test_inhibit_current() {
        let bench = SimBench::new();
        let step = step("INHIBITCURRENT", 1, Conditions::new(48.0).with_load(1, 2.0).with_inhibit(true));
        InhibitCurrentMeasurement.validate(&step).unwrap();

        let measured = measure(&bench, &InhibitCurrentMeasurement, &step).unwrap();
        assert!((measured.primary().magnitude() - 0.002).abs() < 1e-9);
        assert!(bench.inhibit());

        let not_inhibited = self::step("INHIBITCURRENT", 1, Conditions::new(48.0));
        assert!(InhibitCurrentMeasurement.validate(&not_inhibited).is_err());
    }

    #[test]
    fn test_inhibit_ignored_is_dut_fault() {
        let bench = SimBench::new();
        bench.faults_mut().inhibit_ignored = true;
        let step = step("INHIBITCURRENT", 1, Conditions::new(48.0).with_load(1, 2.0).with_inhibit(true));

        let err = measure(&bench, &InhibitCurrentMeasurement, &step).unwrap_err();
        assert!(matches!(err.dut_fault(), Some(DutFault::InhibitFailure { output: 1 })));
    }

    #[test]
    fn test_short_circuit_current_releases_short() {
        let bench = SimBench::new();
        let step = step("SHORTCIRCUITCURRENT", 1, Conditions::new(48.0).with_load(1, 2.0));
        assert!(!ShortCircuitCurrentMeasurement.supports_speedup());

        let measured = measure(&bench, &ShortCircuitCurrentMeasurement, &step).unwrap();
        assert!((measured.primary().magnitude() - 6.0).abs() < 1e-9);
        assert!((measured.values[1].magnitude() - 4.99).abs() < 1e-9);
    }

    #[test]
    fn test_short_circuit_without_recovery_is_dut_fault() {
        let bench = SimBench::new();
        bench.faults_mut().no_short_recovery = true;
        let step = step("SHORTCIRCUITCURRENT", 1, Conditions::new(48.0).with_load(1, 2.0));

        let err = measure(&bench, &ShortCircuitCurrentMeasurement, &step).unwrap_err();
        assert!(matches!(err.dut_fault(), Some(DutFault::NoShortRecovery { output: 1 })));
    }
}
