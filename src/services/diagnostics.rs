//! Pre-test diagnostics run at synchronize, before any step executes.
//!
//! A diagnostic either reports measurements and passes, or names a
//! nonrecoverable fixture problem that prevents the sequence from running.
//! Instrument faults propagate as errors.

use tracing::{info, warn};

use crate::domain::errors::{StationError, StationResult};
use crate::domain::models::{DiagnosticRecord, DiagnosticsConfig, Limits, ScaledValue, Units};
use crate::domain::ports::{check_instrument, DmmFunction, InstrumentRack};

/// Lowest acceptable line read-back, as a fraction of nominal.
const MIN_LINE_FRACTION: f64 = 0.9;

/// Readings below this on the reference output mean a reversed DUT.
const REVERSED_THRESHOLD_VOLTS: f64 = -0.1;

const REPORT_PRECISION: u8 = 4;

/// Result of one diagnostic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiagnosticOutcome {
    pub measurements: Vec<DiagnosticRecord>,
    /// Why the sequence cannot run, if it cannot.
    pub failure: Option<String>,
}

impl DiagnosticOutcome {
    pub const fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// A check of the fixture and DUT connection.
pub trait PreTestDiagnostic {
    fn name(&self) -> &'static str;

    fn run(&self, rack: &mut InstrumentRack, config: &DiagnosticsConfig) -> StationResult<DiagnosticOutcome>;
}

/// Built-in diagnostics in run order.
pub fn default_diagnostics() -> Vec<Box<dyn PreTestDiagnostic>> {
    vec![Box::new(PowerConnectionCheck), Box::new(OrientationCheck)]
}

/// Apply nominal line with every load off, run `body`, then turn the line
/// off whatever `body` returned.
fn with_unloaded_line<T>(
    rack: &mut InstrumentRack,
    config: &DiagnosticsConfig,
    body: impl FnOnce(&mut InstrumentRack) -> StationResult<T>,
) -> StationResult<T> {
    let powered = power_unloaded(rack, config).and_then(|()| body(rack));

    let off = rack.line.set_output(false);
    match (powered, off) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), off) => {
            if let Err(off_err) = off {
                warn!(error = %off_err, "line off failed after diagnostic error");
            }
            Err(err)
        }
    }
}

fn power_unloaded(rack: &mut InstrumentRack, config: &DiagnosticsConfig) -> StationResult<()> {
    for channel in 1..=rack.load.channels() {
        rack.load.set_enabled(channel, false)?;
    }
    rack.relays.set_inhibit(false)?;
    rack.line.set_current_limit(config.max_idle_input_amps * 2.0)?;
    rack.line.set_voltage(config.nominal_line_volts)?;
    rack.line.set_output(true)?;
    check_instrument(rack.line.as_mut())
}

/// Idle input current and line read-back under nominal line.
pub struct PowerConnectionCheck;

impl PreTestDiagnostic for PowerConnectionCheck {
    fn name(&self) -> &'static str {
        "power connection"
    }

    fn run(&self, rack: &mut InstrumentRack, config: &DiagnosticsConfig) -> StationResult<DiagnosticOutcome> {
        let (amps, volts, limiting) = with_unloaded_line(rack, config, |rack| {
            let amps = rack.line.measure_current()?.magnitude();
            let volts = rack.line.measure_voltage()?.magnitude();
            let limiting = rack.line.in_current_limit()?;
            Ok((amps, volts, limiting))
        })?;

        let max_amps = config.max_idle_input_amps;
        let min_volts = config.nominal_line_volts * MIN_LINE_FRACTION;
        let measurements = vec![
            DiagnosticRecord {
                name: "IDLE INPUT CURRENT".to_string(),
                value: ScaledValue::new(amps, REPORT_PRECISION),
                limits: Some(Limits::new(
                    ScaledValue::new(0.0, REPORT_PRECISION),
                    ScaledValue::new(max_amps, REPORT_PRECISION),
                )),
                units: Units::Amps,
            },
            DiagnosticRecord {
                name: "LINE VOLTAGE".to_string(),
                value: ScaledValue::new(volts, 2),
                limits: None,
                units: Units::Volts,
            },
        ];

        let failure = if limiting || amps > max_amps {
            Some(format!(
                "idle input current {amps:.3} A exceeds {max_amps:.3} A; DUT may be shorted"
            ))
        } else if volts < min_volts {
            Some(format!(
                "line reads {volts:.2} V against {:.2} V nominal; check the power connection",
                config.nominal_line_volts
            ))
        } else {
            None
        };

        Ok(DiagnosticOutcome {
            measurements,
            failure,
        })
    }
}

/// Reference output polarity, to catch a DUT inserted backwards.
pub struct OrientationCheck;

impl PreTestDiagnostic for OrientationCheck {
    fn name(&self) -> &'static str {
        "orientation"
    }

    fn run(&self, rack: &mut InstrumentRack, config: &DiagnosticsConfig) -> StationResult<DiagnosticOutcome> {
        let output = config.orientation_output;
        if output == 0 {
            return Err(StationError::Config(
                "diagnostics.orientation_output must be at least 1".to_string(),
            ));
        }
        let volts = with_unloaded_line(rack, config, |rack| {
            let volts = rack.dmm.measure(DmmFunction::DcVolts, output)?.magnitude();
            check_instrument(rack.dmm.as_mut())?;
            Ok(volts)
        })?;

        let failure = (volts < REVERSED_THRESHOLD_VOLTS).then(|| {
            format!("output {output} reads {volts:.3} V; DUT appears reversed in the fixture")
        });

        Ok(DiagnosticOutcome {
            measurements: vec![DiagnosticRecord {
                name: format!("ORIENTATION OUT{output}"),
                value: ScaledValue::new(volts, REPORT_PRECISION),
                limits: None,
                units: Units::Volts,
            }],
            failure,
        })
    }
}

/// Run `diagnostics` in order, stopping at the first nonrecoverable failure.
pub fn run_diagnostics(
    diagnostics: &[Box<dyn PreTestDiagnostic>],
    rack: &mut InstrumentRack,
    config: &DiagnosticsConfig,
) -> StationResult<DiagnosticOutcome> {
    let mut combined = DiagnosticOutcome::default();
    for diagnostic in diagnostics {
        let outcome = diagnostic.run(rack, config)?;
        combined.measurements.extend(outcome.measurements);
        if let Some(reason) = outcome.failure {
            warn!(diagnostic = diagnostic.name(), %reason, "pre-test diagnostic failed");
            combined.failure = Some(format!("{}: {reason}", diagnostic.name()));
            return Ok(combined);
        }
        info!(diagnostic = diagnostic.name(), "pre-test diagnostic passed");
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::instruments::{SimBench, SimKind};

    #[test]
    fn test_healthy_dut_passes() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let outcome = run_diagnostics(&default_diagnostics(), &mut rack, &DiagnosticsConfig::default()).unwrap();

        assert!(outcome.passed());
        assert_eq!(outcome.measurements.len(), 3);
        assert!(!bench.line_enabled());
    }

    #[test]
    fn test_overcurrent_fails_power_check() {
        let bench = SimBench::new();
        bench.faults_mut().overcurrent = true;
        let mut rack = bench.rack();

        let outcome = PowerConnectionCheck.run(&mut rack, &DiagnosticsConfig::default()).unwrap();
        assert!(outcome.failure.unwrap().contains("shorted"));
        assert!(!bench.line_enabled());
    }

    #[test]
    fn test_bad_connection_fails_power_check() {
        let bench = SimBench::new();
        bench.faults_mut().bad_connection = true;
        let mut rack = bench.rack();

        let outcome = PowerConnectionCheck.run(&mut rack, &DiagnosticsConfig::default()).unwrap();
        assert!(outcome.failure.unwrap().contains("power connection"));
    }

    #[test]
    fn test_reversed_dut_stops_diagnostics() {
        let bench = SimBench::new();
        bench.faults_mut().reversed = true;
        let mut rack = bench.rack();

        let outcome = run_diagnostics(&default_diagnostics(), &mut rack, &DiagnosticsConfig::default()).unwrap();
        let reason = outcome.failure.unwrap();
        assert!(reason.starts_with("orientation:"));
        assert!(reason.contains("reversed"));
    }

    #[test]
    fn test_instrument_fault_propagates_and_line_off() {
        let bench = SimBench::new();
        bench.faults_mut().bus_failure = Some(SimKind::Dmm);
        let mut rack = bench.rack();

        let err = OrientationCheck.run(&mut rack, &DiagnosticsConfig::default()).unwrap_err();
        assert!(err.is_fatal());
        assert!(!bench.line_enabled());
    }
}
