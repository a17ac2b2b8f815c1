//! Sequence controller: loads a part's test list and runs it step by step.
//!
//! Lifecycle is `Unsynchronized -> Synchronized -> Running -> Completed |
//! Aborted`. [`SequenceController::synchronize`] loads and validates the
//! step list and runs the pre-test diagnostics;
//! [`SequenceController::perform_sequence`] executes it.
//!
//! DUT-kind errors fail the step they occur in and the sequence carries
//! on. Any other fault is logged and returned unchanged; shutting the rack
//! down is the caller's job. Steps asking for hardware the rack lacks are
//! rejected at synchronize, before anything is powered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use super::diagnostics::{default_diagnostics, run_diagnostics, PreTestDiagnostic};
use super::measurement::Measurement;
use super::protocol::{finalize, MeasurementProtocol};
use super::registry::MeasurementRegistry;
use super::speedup::SpeedupCache;
use crate::domain::errors::{ErrorCode, FaultKind, StationError, StationResult};
use crate::domain::models::{
    DiagnosticRecord, DiagnosticsConfig, Limits, OutputChannel, ScaledValue, SequenceConfig,
    SequenceState, Setpoint, StationConfig, StepRecord, TestStep, Units, DIAGNOSTIC_FAILURE_TEST,
};
use crate::domain::ports::{InstrumentRack, LimitsProvider, ResultSink};

/// A validated step paired with the strategy that measures it.
struct PlannedStep {
    step: TestStep,
    strategy: Box<dyn Measurement>,
}

/// Drives one DUT through its test list.
pub struct SequenceController<L: LimitsProvider, S: ResultSink> {
    limits: L,
    sink: S,
    registry: MeasurementRegistry,
    protocol: MeasurementProtocol,
    cache: SpeedupCache,
    sequence: SequenceConfig,
    diagnostics_config: DiagnosticsConfig,
    diagnostics: Vec<Box<dyn PreTestDiagnostic>>,
    abort: Arc<AtomicBool>,
    state: SequenceState,
    steps: Vec<PlannedStep>,
    test_counter: u32,
    executed: usize,
    all_passed: bool,
    diagnostic_failure: Option<String>,
}

impl<L: LimitsProvider, S: ResultSink> SequenceController<L, S> {
    /// Controller with the built-in strategies and diagnostics.
    pub fn new(limits: L, sink: S, config: &StationConfig) -> Self {
        Self {
            limits,
            sink,
            registry: MeasurementRegistry::with_builtins(),
            protocol: MeasurementProtocol::new(config.protocol.clone()),
            cache: SpeedupCache::new(),
            sequence: config.sequence.clone(),
            diagnostics_config: config.diagnostics.clone(),
            diagnostics: default_diagnostics(),
            abort: Arc::new(AtomicBool::new(false)),
            state: SequenceState::Unsynchronized,
            steps: Vec::new(),
            test_counter: 0,
            executed: 0,
            all_passed: true,
            diagnostic_failure: None,
        }
    }

    #[must_use]
    pub fn with_registry(mut self, registry: MeasurementRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_diagnostics(mut self, diagnostics: Vec<Box<dyn PreTestDiagnostic>>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub const fn state(&self) -> SequenceState {
        self.state
    }

    pub const fn sequence_config(&self) -> &SequenceConfig {
        &self.sequence
    }

    /// Sequence settings take effect at the next synchronize.
    pub fn sequence_config_mut(&mut self) -> &mut SequenceConfig {
        &mut self.sequence
    }

    pub const fn registry(&self) -> &MeasurementRegistry {
        &self.registry
    }

    /// Descriptors of the planned steps, in execution order.
    pub fn steps(&self) -> impl Iterator<Item = &TestStep> {
        self.steps.iter().map(|planned| &planned.step)
    }

    pub const fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    /// Steps attempted in the current run, errors included.
    pub const fn test_counter(&self) -> u32 {
        self.test_counter
    }

    pub const fn cache_hits(&self) -> u32 {
        self.cache.hits()
    }

    pub fn diagnostic_failure(&self) -> Option<&str> {
        self.diagnostic_failure.as_deref()
    }

    pub const fn is_dut_error(&self) -> bool {
        self.protocol.is_dut_error()
    }

    /// Shared flag an operator console sets to refuse the next synchronize.
    pub fn abort_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.abort)
    }

    pub fn request_abort(&self) {
        self.abort.store(true, Ordering::SeqCst);
    }

    /// True iff every executed step passed and no diagnostic failed.
    pub const fn sequence_status(&self) -> bool {
        self.all_passed && self.diagnostic_failure.is_none()
    }

    /// Load, validate and prepare the step list. Returns the number of
    /// executable steps, which is zero after a diagnostic failure.
    #[instrument(skip_all, fields(dash = %self.sequence.dash, test_type = %self.sequence.test_type))]
    pub fn synchronize(&mut self, rack: &mut InstrumentRack) -> StationResult<usize> {
        if !self.state.can_synchronize() {
            return Err(StationError::InvalidState {
                expected: "not running".to_string(),
                found: self.state.to_string(),
            });
        }
        if self.abort.swap(false, Ordering::SeqCst) {
            warn!("operator abort pending, refusing to synchronize");
            return Err(StationError::OperatorAbort);
        }

        self.state = SequenceState::Unsynchronized;
        self.steps.clear();
        self.test_counter = 0;
        self.executed = 0;
        self.all_passed = true;
        self.diagnostic_failure = None;
        self.cache.clear();
        self.protocol.reset();

        let mut steps = self.load_plan()?;
        for planned in &steps {
            check_fits_rack(&planned.step, planned.strategy.as_ref(), rack)?;
        }

        if self.diagnostics_config.enabled {
            let outcome = run_diagnostics(&self.diagnostics, rack, &self.diagnostics_config)?;
            for measurement in outcome.measurements {
                self.sink.record_diagnostic(measurement);
            }
            if let Some(reason) = outcome.failure {
                error!(%reason, "pre-test diagnostics failed, no steps will run");
                self.sink.record_step(diagnostic_failure_record(&reason));
                self.diagnostic_failure = Some(reason);
                self.all_passed = false;
                steps.clear();
            }
        }
        // Diagnostics drove the instruments directly.
        self.protocol.reset();

        self.steps = steps;
        self.state = SequenceState::Synchronized;
        info!(steps = self.steps.len(), "sequence synchronized");
        Ok(self.steps.len())
    }

    /// Load and validate the configured test list without touching any
    /// instrument or changing the controller state.
    pub fn preview(&self) -> StationResult<Vec<TestStep>> {
        Ok(self.load_plan()?.into_iter().map(|planned| planned.step).collect())
    }

    fn load_plan(&self) -> StationResult<Vec<PlannedStep>> {
        let records = self
            .limits
            .get_tests(&self.sequence.dash, &self.sequence.test_type)?;
        let mut steps = Vec::with_capacity(records.len());
        for (index, record) in records.iter().enumerate() {
            let step = TestStep::from_record(index, record)?;
            let strategy = self.registry.create(step.software_name())?;
            strategy.validate(&step)?;
            steps.push(PlannedStep { step, strategy });
        }
        Ok(steps)
    }

    /// Run every planned step in order. Returns [`Self::sequence_status`].
    #[instrument(skip_all, fields(dash = %self.sequence.dash, steps = self.steps.len()))]
    pub fn perform_sequence(&mut self, rack: &mut InstrumentRack) -> StationResult<bool> {
        if self.state != SequenceState::Synchronized {
            return Err(StationError::InvalidState {
                expected: SequenceState::Synchronized.to_string(),
                found: self.state.to_string(),
            });
        }
        self.state = SequenceState::Running;

        let steps = std::mem::take(&mut self.steps);
        let result = self.run_steps(rack, &steps);
        self.steps = steps;

        match result {
            Ok(()) => {
                self.state = SequenceState::Completed;
                let status = self.sequence_status();
                info!(
                    executed = self.executed,
                    counter = self.test_counter,
                    cache_hits = self.cache.hits(),
                    passed = status,
                    "sequence complete"
                );
                Ok(status)
            }
            Err(err) => {
                self.state = SequenceState::Aborted;
                Err(err)
            }
        }
    }

    fn run_steps(&mut self, rack: &mut InstrumentRack, steps: &[PlannedStep]) -> StationResult<()> {
        for planned in steps {
            self.test_counter += 1;
            let passed = self.run_step(rack, planned)?;
            self.executed += 1;
            if !passed {
                self.all_passed = false;
                if self.sequence.stop_on_first_failure {
                    info!(test = planned.step.display_name(), "stopping at first failure");
                    break;
                }
            }
        }
        Ok(())
    }

    fn run_step(&mut self, rack: &mut InstrumentRack, planned: &PlannedStep) -> StationResult<bool> {
        let step = &planned.step;
        let strategy = planned.strategy.as_ref();

        if self.protocol.is_dut_error() {
            let message = format!(
                "{}: not measured, DUT fault detected earlier in the sequence",
                step.display_name()
            );
            self.record(step, ScaledValue::bad_measurement(), false, step.error_code(), Some(message), false);
            return Ok(false);
        }

        let cacheable = self.sequence.speedup_enabled
            && step.speedup_eligible()
            && strategy.supports_speedup();
        let cached = if cacheable {
            self.cache.lookup(strategy.name(), step.conditions(), step.output())
        } else {
            None
        };

        let (raw, from_cache) = match cached {
            Some(raw) => (raw, true),
            None => match self.protocol.execute(rack, strategy, step) {
                Ok(raw) => {
                    if cacheable && !raw.is_bad() {
                        self.cache.store(strategy.name(), step.conditions(), step.output(), raw.clone());
                    }
                    (raw, false)
                }
                Err(err) if err.kind() != FaultKind::Dut => {
                    if err.is_fatal() {
                        error!(
                            test = step.display_name(),
                            index = step.index(),
                            output = step.output(),
                            kind = %err.kind(),
                            error = %err,
                            "station fault, aborting sequence"
                        );
                    } else {
                        warn!(
                            test = step.display_name(),
                            index = step.index(),
                            kind = %err.kind(),
                            error = %err,
                            "station problem, aborting sequence"
                        );
                    }
                    return Err(err);
                }
                Err(err) => {
                    let message = err.operator_message(step.display_name());
                    warn!(test = step.display_name(), index = step.index(), error = %err, "step failed");
                    let code = if err.dut_fault().is_some() {
                        err.error_code()
                    } else {
                        step.error_code()
                    };
                    self.record(step, ScaledValue::bad_measurement(), false, code, Some(message), false);
                    return Ok(false);
                }
            },
        };

        let measured = finalize(step, &raw);
        let value = measured.primary();
        let passed = step.limits().check(&value);
        let code = if passed { ErrorCode::NoDutError } else { step.error_code() };

        for extra in &measured.extras {
            self.sink.record_diagnostic(DiagnosticRecord {
                name: format!("{} {}", step.display_name(), extra.name),
                value: extra.value,
                limits: None,
                units: step.units(),
            });
        }

        info!(
            test = step.display_name(),
            index = step.index(),
            output = step.output(),
            value = %value,
            passed,
            from_cache,
            "step measured"
        );
        self.record(step, value, passed, code, None, from_cache);
        Ok(passed)
    }

    fn record(
        &mut self,
        step: &TestStep,
        value: ScaledValue,
        passed: bool,
        error_code: ErrorCode,
        message: Option<String>,
        from_cache: bool,
    ) {
        self.sink.record_step(StepRecord {
            test_number: self.test_counter,
            name: step.display_name().to_string(),
            software_name: step.software_name().to_string(),
            output: step.output(),
            value,
            limits: *step.limits(),
            units: step.units(),
            passed,
            error_code,
            message,
            from_cache,
            timestamp: Utc::now(),
        });
    }
}

/// Reject a step whose conditions need hardware the rack does not have.
fn check_fits_rack(step: &TestStep, strategy: &dyn Measurement, rack: &InstrumentRack) -> StationResult<()> {
    let axes = strategy.axes();
    let conditions = step.conditions();
    let reject = |reason: String| -> StationResult<()> {
        Err(StationError::Config(format!("test '{}': {reason}", step.display_name())))
    };

    let channels = rack.load.channels();
    let missing_load = |channel: OutputChannel| channel == 0 || channel > channels;
    if axes.loads {
        if let Some(load) = conditions.loads.iter().find(|l| missing_load(l.channel)) {
            return reject(format!(
                "load channel {} does not exist (load has {channels} channels)",
                load.channel
            ));
        }
    }
    // Strategies without the short axis short the step output themselves.
    if (conditions.short || !axes.short) && missing_load(step.output()) {
        return reject(format!(
            "cannot short output {}, load has {channels} channels",
            step.output()
        ));
    }

    if axes.aux {
        let fitted = rack.aux.len();
        let unfitted = conditions
            .aux
            .iter()
            .enumerate()
            .find(|&(index, setpoint)| index >= fitted && matches!(setpoint, Setpoint::Volts(_)));
        if let Some((index, _)) = unfitted {
            return reject(format!("auxiliary supply {index} is not fitted ({fitted} configured)"));
        }
    }

    if axes.temperature && conditions.temperature.is_some() && rack.chamber.is_none() {
        return reject("sets TEMPERATURE but no temperature controller is configured".to_string());
    }
    Ok(())
}

fn diagnostic_failure_record(reason: &str) -> StepRecord {
    let zero = ScaledValue::new(0.0, 0);
    StepRecord {
        test_number: 0,
        name: DIAGNOSTIC_FAILURE_TEST.to_string(),
        software_name: DIAGNOSTIC_FAILURE_TEST.to_string(),
        output: 0,
        value: ScaledValue::bad_measurement(),
        limits: Limits::new(zero, zero),
        units: Units::Unitless,
        passed: false,
        error_code: ErrorCode::NoDutError,
        message: Some(reason.to_string()),
        from_cache: false,
        timestamp: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::instruments::{SimBench, SimKind};
    use crate::adapters::limits::InMemoryLimitsProvider;
    use crate::domain::errors::DutFault;
    use crate::domain::models::{ProtocolConfig, TestRecord};
    use crate::services::results::ResultCollector;

    fn vout(output: u8, min: &str, max: &str) -> TestRecord {
        TestRecord::new("VOUTDC")
            .param("OUTPUT", output.to_string())
            .param("VIN", "48")
            .param("LOAD", "2.0")
            .param("MIN", min)
            .param("MAX", max)
            .param("UNITS", "V")
    }

    fn iin() -> TestRecord {
        TestRecord::new("IIN = Input Current")
            .param("VIN", "48")
            .param("LOAD", "2.0")
            .param("MIN", "0")
            .param("MAX", "0.5")
            .param("UNITS", "A")
    }

    fn controller(records: Vec<TestRecord>) -> SequenceController<InMemoryLimitsProvider, ResultCollector> {
        let mut config = StationConfig::default();
        config.sequence.dash = "1234-01".to_string();
        config.protocol = ProtocolConfig::immediate();
        let limits = InMemoryLimitsProvider::new().with_tests("1234-01", "FINAL", records);
        SequenceController::new(limits, ResultCollector::new(), &config)
    }

    #[test]
    fn test_synchronize_plans_steps() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let mut seq = controller(vec![vout(1, "4.95", "5.05"), iin()]);

        assert_eq!(seq.synchronize(&mut rack).unwrap(), 2);
        assert_eq!(seq.state(), SequenceState::Synchronized);
        let names: Vec<_> = seq.steps().map(TestStep::display_name).collect();
        assert_eq!(names, vec!["VOUTDC", "Input Current"]);
        assert_eq!(seq.sink().diagnostics().len(), 3);
    }

    #[test]
    fn test_preview_leaves_state_untouched() {
        let seq = controller(vec![vout(1, "4.95", "5.05"), iin()]);

        let steps = seq.preview().unwrap();
        assert_eq!(steps.len(), 2);
        assert_eq!(steps[1].software_name(), "IIN");
        assert_eq!(seq.state(), SequenceState::Unsynchronized);
        assert!(seq.sink().diagnostics().is_empty());
    }

    #[test]
    fn test_unknown_type_fails_synchronize() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let mut seq = controller(vec![TestRecord::new("WOBBLE").param("VIN", "48").param("MIN", "0").param("MAX", "1")]);

        let err = seq.synchronize(&mut rack).unwrap_err();
        assert!(matches!(err, StationError::NoMeasurementType(ref name) if name == "WOBBLE"));
        assert_eq!(seq.state(), SequenceState::Unsynchronized);
    }

    #[test]
    fn test_operator_abort_refuses_once() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let mut seq = controller(vec![vout(1, "4.95", "5.05")]);

        seq.abort_handle().store(true, Ordering::SeqCst);
        assert!(matches!(seq.synchronize(&mut rack), Err(StationError::OperatorAbort)));
        assert_eq!(seq.synchronize(&mut rack).unwrap(), 1);
    }

    #[test]
    fn test_perform_requires_synchronize() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let mut seq = controller(vec![vout(1, "4.95", "5.05")]);

        assert!(matches!(
            seq.perform_sequence(&mut rack),
            Err(StationError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_passing_sequence() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let mut seq = controller(vec![vout(1, "4.95", "5.05"), iin()]);

        seq.synchronize(&mut rack).unwrap();
        assert!(seq.perform_sequence(&mut rack).unwrap());
        assert_eq!(seq.state(), SequenceState::Completed);
        assert_eq!(seq.test_counter(), 2);

        let steps = seq.sink().steps();
        assert_eq!(steps.len(), 2);
        assert!(steps.iter().all(|s| s.passed && s.error_code == ErrorCode::NoDutError));
        assert_eq!(steps[1].test_number, 2);
    }

    #[test]
    fn test_speedup_reuses_raw_value_with_own_limits() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let mut seq = controller(vec![vout(1, "4.95", "5.05"), vout(1, "5.00", "5.05")]);

        seq.synchronize(&mut rack).unwrap();
        bench.reset_counters();
        assert!(!seq.perform_sequence(&mut rack).unwrap());

        assert_eq!(bench.counters().dmm_reads, 1);
        assert_eq!(seq.cache_hits(), 1);
        let steps = seq.sink().steps();
        assert!(steps[0].passed);
        assert!(!steps[0].from_cache);
        assert!(!steps[1].passed);
        assert!(steps[1].from_cache);
        assert_eq!(steps[0].value.magnitude(), steps[1].value.magnitude());
    }

    #[test]
    fn test_speedup_disabled() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let mut seq = controller(vec![vout(1, "4.95", "5.05"), vout(1, "4.95", "5.05")]);
        seq.sequence_config_mut().speedup_enabled = false;

        seq.synchronize(&mut rack).unwrap();
        bench.reset_counters();
        seq.perform_sequence(&mut rack).unwrap();
        assert_eq!(bench.counters().dmm_reads, 2);
        assert_eq!(seq.cache_hits(), 0);
    }

    #[test]
    fn test_dut_fault_short_circuits_remaining_steps() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let mut seq = controller(vec![vout(1, "4.95", "5.05"), iin(), vout(2, "11.9", "12.1")]);

        seq.synchronize(&mut rack).unwrap();
        bench.faults_mut().overcurrent = true;
        assert!(!seq.perform_sequence(&mut rack).unwrap());

        let steps = seq.sink().steps();
        assert_eq!(steps.len(), 3);
        assert_eq!(seq.test_counter(), 3);
        assert_eq!(
            steps[0].error_code,
            ErrorCode::Dut(DutFault::Overcurrent { output: 1 }.code())
        );
        assert!(steps[0].message.as_deref().unwrap().starts_with("VOUTDC: "));
        for skipped in &steps[1..] {
            assert!(!skipped.passed);
            assert!(skipped.value.is_bad());
            assert!(skipped.message.as_deref().unwrap().contains("DUT fault detected earlier"));
        }
        assert!(seq.is_dut_error());
    }

    #[test]
    fn test_stop_on_first_failure() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let mut seq = controller(vec![vout(1, "5.00", "5.05"), iin(), vout(2, "11.9", "12.1")]);
        seq.sequence_config_mut().stop_on_first_failure = true;

        seq.synchronize(&mut rack).unwrap();
        assert!(!seq.perform_sequence(&mut rack).unwrap());
        assert_eq!(seq.sink().steps().len(), 1);
        assert_eq!(seq.test_counter(), 1);
    }

    #[test]
    fn test_station_fault_aborts() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let mut seq = controller(vec![vout(1, "4.95", "5.05"), iin()]);

        seq.synchronize(&mut rack).unwrap();
        bench.faults_mut().bus_failure = Some(SimKind::Dmm);
        let err = seq.perform_sequence(&mut rack).unwrap_err();

        assert!(err.is_fatal());
        assert_eq!(seq.state(), SequenceState::Aborted);
        assert_eq!(seq.test_counter(), 1);
        assert!(seq.sink().steps().is_empty());
    }

    #[test]
    fn test_diagnostic_failure_records_synthetic_step() {
        let bench = SimBench::new();
        bench.faults_mut().reversed = true;
        let mut rack = bench.rack();
        let mut seq = controller(vec![vout(2, "11.9", "12.1")]);

        assert_eq!(seq.synchronize(&mut rack).unwrap(), 0);
        assert!(!seq.sequence_status());
        assert!(seq.diagnostic_failure().unwrap().contains("reversed"));

        let steps = seq.sink().steps();
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].name, DIAGNOSTIC_FAILURE_TEST);
        assert!(!steps[0].passed);

        assert!(!seq.perform_sequence(&mut rack).unwrap());
        assert_eq!(seq.sink().steps().len(), 1);
    }

    #[test]
    fn test_step_needing_missing_hardware_fails_synchronize() {
        let cases = [
            (vout(1, "4.95", "5.05").param("TEMPERATURE", "85"), "temperature controller"),
            (vout(1, "4.95", "5.05").param("LOAD", "2.0, 1.0, 0.5"), "load channel 3"),
            (vout(1, "4.95", "5.05").param("APS", "5, 12"), "auxiliary supply 1"),
            (vout(3, "4.95", "5.05").param("SHORT", "yes"), "cannot short output 3"),
        ];
        for (record, reason) in cases {
            let bench = SimBench::new();
            let mut rack = bench.rack();
            let mut seq = controller(vec![iin(), record]);

            let err = seq.synchronize(&mut rack).unwrap_err();
            assert!(matches!(err, StationError::Config(ref msg) if msg.contains(reason)), "{err}");
            assert!(!err.is_fatal());
            assert_eq!(seq.state(), SequenceState::Unsynchronized);
            assert_eq!(bench.counters().total_calls, 0);
            assert!(seq.sink().steps().is_empty());
        }
    }

    #[test]
    fn test_temperature_step_runs_with_chamber() {
        let bench = SimBench::new();
        let mut rack = bench.rack_with_chamber();
        let mut seq = controller(vec![vout(1, "4.95", "5.05").param("TEMPERATURE", "85")]);

        assert_eq!(seq.synchronize(&mut rack).unwrap(), 1);
        assert!(seq.perform_sequence(&mut rack).unwrap());
    }

    #[test]
    fn test_station_problem_mid_sequence_is_not_a_dut_failure() {
        let mut config = StationConfig::default();
        config.sequence.dash = "1234-01".to_string();
        config.protocol = ProtocolConfig::immediate();
        config.protocol.line_ramp_step_volts = 0.0;
        let line_reg = TestRecord::new("LINEREGULATION")
            .param("VIN", "48")
            .param("VIN_NEXT", "75")
            .param("LOAD", "2.0")
            .param("MIN", "-1")
            .param("MAX", "1")
            .param("UNITS", "%");
        let limits = InMemoryLimitsProvider::new().with_tests("1234-01", "FINAL", vec![iin(), line_reg]);
        let mut seq = SequenceController::new(limits, ResultCollector::new(), &config);

        let bench = SimBench::new();
        let mut rack = bench.rack();
        seq.synchronize(&mut rack).unwrap();
        let err = seq.perform_sequence(&mut rack).unwrap_err();

        assert!(matches!(err, StationError::Config(_)));
        assert!(!err.is_fatal());
        assert_eq!(seq.state(), SequenceState::Aborted);
        assert_eq!(seq.sink().steps().len(), 1);
        assert!(seq.sink().steps()[0].passed);
        assert!(!seq.is_dut_error());
    }

    #[test]
    fn test_cross_regulation_extra_recorded_per_output() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let cross = TestRecord::new("CROSSREGULATION = Cross Reg")
            .param("VIN", "48")
            .param("LOAD", "1.0, 0.5")
            .param("LOAD_NEXT", "-, 2.5")
            .param("MIN", "-1")
            .param("MAX", "1")
            .param("UNITS", "%");
        let mut seq = controller(vec![cross]);

        seq.synchronize(&mut rack).unwrap();
        assert!(seq.perform_sequence(&mut rack).unwrap());

        let names: Vec<_> = seq.sink().diagnostics().iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"Cross Reg OUT2"), "{names:?}");
    }

    #[test]
    fn test_resynchronize_resets_run_state() {
        let bench = SimBench::new();
        let mut rack = bench.rack();
        let mut seq = controller(vec![vout(1, "5.00", "5.05")]);

        seq.synchronize(&mut rack).unwrap();
        assert!(!seq.perform_sequence(&mut rack).unwrap());

        seq.sequence_config_mut().dash = "missing".to_string();
        assert!(matches!(seq.synchronize(&mut rack), Err(StationError::NoFileFound { .. })));
        assert_eq!(seq.test_counter(), 0);
        assert!(seq.sequence_status());
    }
}
