//! Scope retry, acquisition and station-configuration paths on the simulated bench.

mod common;

use common::{controller, controller_with, ripple, station_config, vout};
use teststation::adapters::instruments::SimBench;
use teststation::domain::errors::StationError;
use teststation::domain::models::{SequenceState, TestRecord};

#[test]
fn test_clipping_twice_fails_step_after_one_rescale() {
    let mut config = station_config();
    config.protocol.default_scope_scale_volts = 0.5;
    let bench = SimBench::new();
    let mut rack = bench.rack();
    let mut seq = controller_with(vec![ripple(1), vout(1, "4.95", "5.05")], &config);

    seq.synchronize(&mut rack).unwrap();
    bench.reset_counters();
    bench.faults_mut().clipping = 2;
    assert!(!seq.perform_sequence(&mut rack).unwrap());

    let counters = bench.counters();
    assert_eq!(counters.scope_measures, 2);
    assert_eq!(counters.scope_rescales, 1);
    assert_eq!(bench.scope_scale(1), Some(0.5));

    let steps = seq.sink().steps();
    assert!(!steps[0].passed);
    assert!(steps[0].value.is_bad());
    assert!(steps[0].message.as_deref().unwrap().contains("signal clipped"));
    assert!(steps[1].passed);
}

#[test]
fn test_clipping_once_recovers_on_retry() {
    let bench = SimBench::new();
    let mut rack = bench.rack();
    let mut seq = controller(vec![ripple(1)]);

    seq.synchronize(&mut rack).unwrap();
    bench.reset_counters();
    bench.faults_mut().clipping = 1;
    assert!(seq.perform_sequence(&mut rack).unwrap());

    assert_eq!(bench.counters().scope_measures, 2);
    assert_eq!(bench.counters().scope_rescales, 1);
    assert_eq!(bench.scope_scale(1), Some(1.0));
}

#[test]
fn test_stuck_acquisition_aborts_sequence() {
    let bench = SimBench::new();
    let mut rack = bench.rack();
    let mut seq = controller(vec![ripple(1), vout(1, "4.95", "5.05")]);

    seq.synchronize(&mut rack).unwrap();
    bench.faults_mut().stuck_acquisition = true;
    let err = seq.perform_sequence(&mut rack).unwrap_err();

    assert!(matches!(err, StationError::MeasurementTimeout(_)));
    assert!(err.is_fatal());
    assert_eq!(seq.state(), SequenceState::Aborted);
    assert!(seq.sink().steps().is_empty());
}

#[test]
fn test_failed_rescale_aborts_sequence() {
    let bench = SimBench::new();
    let mut rack = bench.rack();
    let mut seq = controller(vec![ripple(1), vout(1, "4.95", "5.05")]);

    seq.synchronize(&mut rack).unwrap();
    bench.reset_counters();
    {
        let mut faults = bench.faults_mut();
        faults.scope_failures = 1;
        faults.rescale_fails = true;
    }
    let err = seq.perform_sequence(&mut rack).unwrap_err();

    assert!(matches!(err, StationError::RescaleFailed { channel: 1, .. }));
    assert!(err.is_fatal());
    assert_eq!(bench.counters().scope_measures, 1);
    assert!(seq.sink().steps().is_empty());
}

#[test]
fn test_undefined_aux_uses_sequence_default() {
    let mut config = station_config();
    config.protocol.aux_defaults = vec![15.0];

    let bench = SimBench::new();
    let mut rack = bench.rack();
    let mut seq = controller_with(vec![vout(1, "4.95", "5.05").param("APS", "5")], &config);
    seq.synchronize(&mut rack).unwrap();
    assert!(seq.perform_sequence(&mut rack).unwrap());
    assert_eq!(bench.aux_volts(0), Some(5.0));

    let bench = SimBench::new();
    let mut rack = bench.rack();
    let mut seq = controller_with(
        vec![
            vout(1, "4.95", "5.05").param("APS", "5"),
            vout(1, "4.95", "5.05").param("APS", "UNDEFINED"),
        ],
        &config,
    );
    seq.synchronize(&mut rack).unwrap();
    assert!(seq.perform_sequence(&mut rack).unwrap());
    assert_eq!(bench.aux_volts(0), Some(15.0));
}

#[test]
fn test_missing_hardware_stops_station_not_dut() {
    let hot = TestRecord::new("VOUTDC = Hot Vout")
        .param("VIN", "48")
        .param("LOAD", "2.0")
        .param("TEMPERATURE", "85")
        .param("MIN", "4.95")
        .param("MAX", "5.05")
        .param("UNITS", "V");
    let three_loads = TestRecord::new("VOUTDC = Three Loads")
        .param("VIN", "48")
        .param("LOAD", "2.0, 1.0, 0.5")
        .param("MIN", "4.95")
        .param("MAX", "5.05")
        .param("UNITS", "V");

    let bench = SimBench::new();
    let mut rack = bench.rack();
    let mut seq = controller(vec![vout(1, "4.95", "5.05"), hot.clone(), three_loads.clone()]);
    let err = seq.synchronize(&mut rack).unwrap_err();
    assert!(matches!(err, StationError::Config(ref msg) if msg.contains("Hot Vout")));
    assert!(!err.is_fatal());
    assert!(seq.sink().steps().is_empty());
    assert!(seq.perform_sequence(&mut rack).is_err());

    let bench = SimBench::new();
    let mut rack = bench.rack_with_chamber();
    let mut seq = controller(vec![vout(1, "4.95", "5.05"), hot, three_loads]);
    let err = seq.synchronize(&mut rack).unwrap_err();
    assert!(matches!(err, StationError::Config(ref msg) if msg.contains("Three Loads")));
}
