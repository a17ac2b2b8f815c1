//! Regulation measurements: output voltage change between two operating points.

use super::{percent_change, require_next_line, require_next_load, MeasureContext, Measurement};
use crate::domain::errors::{StationError, StationResult};
use crate::domain::models::{ExtraMeasurement, Measured, OutputChannel, ScaledValue, TestStep};
use crate::domain::ports::{check_instrument, DmmFunction, InstrumentRack};

fn vout(rack: &mut InstrumentRack, output: OutputChannel) -> StationResult<f64> {
    let value = rack.dmm.measure(DmmFunction::DcVolts, output)?;
    check_instrument(rack.dmm.as_mut())?;
    Ok(value.magnitude())
}

fn regulation_result(name: &str, before: f64, after: f64) -> StationResult<Measured> {
    Ok(Measured {
        name: name.to_string(),
        values: vec![
            ScaledValue::new(percent_change(before, after)?, 6),
            ScaledValue::new(before, 6),
            ScaledValue::new(after, 6),
        ],
        extras: Vec::new(),
    })
}

/// `LINEREGULATION`: output change between `VIN` and `VIN_NEXT`, in percent.
pub struct LineRegulationMeasurement;

impl Measurement for LineRegulationMeasurement {
    fn name(&self) -> &'static str {
        "LINEREGULATION"
    }

    fn ramps_line(&self) -> bool {
        true
    }

    fn validate(&self, step: &TestStep) -> StationResult<()> {
        require_next_line(self.name(), step).map(|_| ())
    }

    fn measure(&self, rack: &mut InstrumentRack, step: &TestStep, ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let base = step.conditions().line.volts;
        let next = require_next_line(self.name(), step)?;

        let before = vout(rack, step.output())?;
        ctx.set_line(rack, next, true)?;
        let after = vout(rack, step.output());
        ctx.set_line(rack, base, true)?;

        regulation_result(self.name(), before, after?)
    }
}

/// `LOADREGULATION`: output change between `LOAD` and `LOAD_NEXT` on the
/// measured output, in percent.
pub struct LoadRegulationMeasurement;

impl Measurement for LoadRegulationMeasurement {
    fn name(&self) -> &'static str {
        "LOADREGULATION"
    }

    fn validate(&self, step: &TestStep) -> StationResult<()> {
        require_next_load(self.name(), step, step.output()).map(|_| ())
    }

    fn measure(&self, rack: &mut InstrumentRack, step: &TestStep, ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let output = step.output();
        let (base, next) = require_next_load(self.name(), step, output)?;
        let mode = step.conditions().load(output).map(|l| l.mode).unwrap_or_default();

        let before = vout(rack, output)?;
        ctx.set_load(rack, output, mode, next)?;
        let after = vout(rack, output);
        ctx.set_load(rack, output, mode, base)?;

        regulation_result(self.name(), before, after?)
    }
}

/// `CROSSREGULATION`: change on every loaded output when the *other*
/// outputs step to their `LOAD_NEXT` levels.
///
/// The step's own output is the limit-checked value; the remaining outputs
/// are reported as extras.
pub struct CrossRegulationMeasurement;

impl CrossRegulationMeasurement {
    fn stepped_channels(step: &TestStep) -> Vec<(OutputChannel, f64, f64)> {
        step.conditions()
            .loads
            .iter()
            .filter(|l| l.channel != step.output())
            .filter_map(|l| l.next.map(|next| (l.channel, l.value, next)))
            .collect()
    }
}

impl Measurement for CrossRegulationMeasurement {
    fn name(&self) -> &'static str {
        "CROSSREGULATION"
    }

    fn validate(&self, step: &TestStep) -> StationResult<()> {
        if step.conditions().load(step.output()).is_none() || Self::stepped_channels(step).is_empty() {
            return Err(StationError::FileError(format!(
                "CROSSREGULATION test '{}' needs a load on output {} and LOAD_NEXT on another output",
                step.display_name(),
                step.output()
            )));
        }
        Ok(())
    }

    fn measure(&self, rack: &mut InstrumentRack, step: &TestStep, ctx: &mut MeasureContext<'_>) -> StationResult<Measured> {
        let channels: Vec<OutputChannel> = step.conditions().loads.iter().map(|l| l.channel).collect();
        let stepped = Self::stepped_channels(step);

        let mut before = Vec::with_capacity(channels.len());
        for &channel in &channels {
            before.push(vout(rack, channel)?);
        }

        for &(channel, _, next) in &stepped {
            let mode = step.conditions().load(channel).map(|l| l.mode).unwrap_or_default();
            ctx.set_load(rack, channel, mode, next)?;
        }
        let after: StationResult<Vec<f64>> = channels.iter().map(|&ch| vout(rack, ch)).collect();
        for &(channel, base, _) in &stepped {
            let mode = step.conditions().load(channel).map(|l| l.mode).unwrap_or_default();
            ctx.set_load(rack, channel, mode, base)?;
        }
        let after = after?;

        let mut measured = Measured {
            name: self.name().to_string(),
            values: Vec::new(),
            extras: Vec::new(),
        };
        for ((&channel, &b), &a) in channels.iter().zip(&before).zip(&after) {
            let change = ScaledValue::new(percent_change(b, a)?, 6);
            if channel == step.output() {
                measured.values.insert(0, change);
            } else {
                measured = measured.with_extra(ExtraMeasurement {
                    name: format!("OUT{channel}"),
                    output: channel,
                    value: change,
                });
            }
        }
        Ok(measured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::instruments::SimBench;
    use crate::domain::models::{Conditions, Limits, ProtocolConfig, Units};
    use crate::services::protocol::MeasurementProtocol;

    fn step(name: &str, conditions: Conditions) -> TestStep {
        TestStep::new(0, name, 1, conditions, Limits::parse("-1", "1").unwrap(), Units::Percent)
    }

    fn ideal_bench() -> SimBench {
        let bench = SimBench::new();
        bench.dut_mut().line_regulation = 0.0;
        bench
    }

    #[test]
    fn test_line_regulation_ramps_both_ways() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let mut config = ProtocolConfig::immediate();
        config.line_ramp_step_volts = 10.0;
        let mut protocol = MeasurementProtocol::new(config);
        let step = step(
            "LINEREGULATION",
            Conditions::new(48.0).with_next_line(75.0).with_load(1, 2.0),
        );

        let measured = protocol.execute(&mut rack, &LineRegulationMeasurement, &step).unwrap();

        assert_eq!(
            bench.line_setpoints(),
            vec![10.0, 20.0, 30.0, 40.0, 48.0, 58.0, 68.0, 75.0, 65.0, 55.0, 48.0]
        );
        assert!((bench.line_volts() - 48.0).abs() < f64::EPSILON);

        let expected = 0.0005 * 27.0 / 4.99 * 100.0;
        assert!((measured.primary().magnitude() - expected).abs() < 1e-6);
        assert!((measured.values[1].magnitude() - 4.99).abs() < 1e-9);
    }

    #[test]
    fn test_line_regulation_needs_next_line() {
        let step = step("LINEREGULATION", Conditions::new(48.0).with_load(1, 2.0));
        assert!(matches!(
            LineRegulationMeasurement.validate(&step),
            Err(StationError::FileError(_))
        ));
    }

    #[test]
    fn test_load_regulation_restores_load() {
        let bench = ideal_bench();
        let mut rack = bench.rack();
        let mut protocol = MeasurementProtocol::new(ProtocolConfig::immediate());
        let step = step(
            "LOADREGULATION",
            Conditions::new(48.0).with_load(1, 1.0).with_next_load(1, 3.0),
        );

        let measured = protocol.execute(&mut rack, &LoadRegulationMeasurement, &step).unwrap();

        let expected = (4.985 - 4.995) / 4.995 * 100.0;
        assert!((measured.primary().magnitude() - expected).abs() < 1e-6);
        assert_eq!(bench.load_level(1), Some(1.0));

        let no_next = self::step("LOADREGULATION", Conditions::new(48.0).with_load(1, 1.0));
        assert!(LoadRegulationMeasurement.validate(&no_next).is_err());
    }

    #[test]
    fn test_cross_regulation_reports_other_outputs_as_extras() {
        let bench = ideal_bench();
        let mut rack = bench.rack();
        let mut protocol = MeasurementProtocol::new(ProtocolConfig::immediate());
        let step = step(
            "CROSSREGULATION",
            Conditions::new(48.0)
                .with_load(1, 1.0)
                .with_load(2, 0.5)
                .with_next_load(2, 2.5),
        );
        CrossRegulationMeasurement.validate(&step).unwrap();

        let measured = protocol.execute(&mut rack, &CrossRegulationMeasurement, &step).unwrap();

        let own = (4.9925 - 4.9945) / 4.9945 * 100.0;
        assert!((measured.primary().magnitude() - own).abs() < 1e-6);
        assert_eq!(measured.extras.len(), 1);
        let extra = &measured.extras[0];
        assert_eq!(extra.name, "OUT2");
        assert_eq!(extra.output, 2);
        let other = (11.9865 - 11.9965) / 11.9965 * 100.0;
        assert!((extra.value.magnitude() - other).abs() < 1e-6);
        assert_eq!(bench.load_level(2), Some(0.5));
    }

    #[test]
    fn test_cross_regulation_needs_another_stepped_output() {
        let own_only = step(
            "CROSSREGULATION",
            Conditions::new(48.0).with_load(1, 1.0).with_next_load(1, 2.0),
        );
        assert!(CrossRegulationMeasurement.validate(&own_only).is_err());
    }
}
