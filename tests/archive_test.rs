//! JSON result archives written after a sequence.

mod common;

use common::{controller, station_config, vout, DASH, TEST_TYPE};
use teststation::adapters::instruments::SimBench;
use teststation::domain::errors::StationError;
use teststation::services::ResultCollector;

#[test]
fn test_archive_round_trip_keeps_bad_values() {
    let bench = SimBench::new();
    let mut rack = bench.rack();
    let mut seq = controller(vec![vout(1, "4.95", "5.05"), vout(2, "11.90", "12.10")]);
    seq.synchronize(&mut rack).unwrap();
    bench.faults_mut().overcurrent = true;
    let passed = seq.perform_sequence(&mut rack).unwrap();
    assert!(!passed);

    let archive = seq.sink().to_archive(DASH, TEST_TYPE, passed);
    let dir = tempfile::tempdir().unwrap();
    let path = ResultCollector::write_archive(&dir.path().join("results"), &archive).unwrap();
    assert!(path.file_name().unwrap().to_string_lossy().starts_with("1234-01_final_"));

    let text = std::fs::read_to_string(&path).unwrap();
    assert!(text.contains("\"magnitude\": null"));

    let restored = ResultCollector::read_archive(&path).unwrap();
    assert_eq!(restored.run_id, archive.run_id);
    assert_eq!(restored.summary, archive.summary);
    assert_eq!(restored.steps.len(), 2);
    assert!(restored.steps.iter().all(|step| step.value.is_bad()));
    assert_eq!(restored.steps[0].error_code, archive.steps[0].error_code);
    assert_eq!(restored.diagnostics.len(), archive.diagnostics.len());
}

#[test]
fn test_passing_archive_summary() {
    let bench = SimBench::new();
    let mut rack = bench.rack();
    let mut seq = controller(vec![vout(1, "4.95", "5.05"), vout(1, "4.90", "5.10")]);
    seq.synchronize(&mut rack).unwrap();
    let passed = seq.perform_sequence(&mut rack).unwrap();

    let archive = seq.sink().to_archive(&station_config().sequence.dash, TEST_TYPE, passed);
    assert!(archive.passed);
    assert_eq!(archive.summary.total, 2);
    assert_eq!(archive.summary.from_cache, 1);
    assert!(archive.summary.all_passed());
}

#[test]
fn test_read_archive_errors() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        ResultCollector::read_archive(&dir.path().join("missing.json")),
        Err(StationError::Archive(_))
    ));

    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ not json").unwrap();
    assert!(matches!(
        ResultCollector::read_archive(&path),
        Err(StationError::Archive(_))
    ));
}
