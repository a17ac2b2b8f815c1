//! Common test utilities for integration tests
//!
//! Shared record builders and a controller wired to the simulated bench.

#![allow(dead_code)]

use teststation::adapters::limits::InMemoryLimitsProvider;
use teststation::domain::models::{ProtocolConfig, StationConfig, TestRecord};
use teststation::services::{ResultCollector, SequenceController};

pub const DASH: &str = "1234-01";
pub const TEST_TYPE: &str = "FINAL";

/// Setup test logging
///
/// Initializes tracing subscriber for test output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Station configuration with zero settle times.
pub fn station_config() -> StationConfig {
    let mut config = StationConfig::default();
    config.sequence.dash = DASH.to_string();
    config.sequence.test_type = TEST_TYPE.to_string();
    config.protocol = ProtocolConfig::immediate();
    config
}

pub fn vout(output: u8, min: &str, max: &str) -> TestRecord {
    TestRecord::new("VOUTDC")
        .param("OUTPUT", output.to_string())
        .param("VIN", "48")
        .param("LOAD", "2.0")
        .param("MIN", min)
        .param("MAX", max)
        .param("UNITS", "V")
}

pub fn input_current() -> TestRecord {
    TestRecord::new("IIN = Input Current")
        .param("VIN", "48")
        .param("LOAD", "2.0")
        .param("MIN", "0")
        .param("MAX", "0.5")
        .param("UNITS", "A")
}

pub fn ripple(output: u8) -> TestRecord {
    TestRecord::new("RIPPLE")
        .param("OUTPUT", output.to_string())
        .param("VIN", "48")
        .param("LOAD", "2.0")
        .param("MIN", "0")
        .param("MAX", "0.050")
        .param("UNITS", "V")
}

pub fn controller(
    records: Vec<TestRecord>,
) -> SequenceController<InMemoryLimitsProvider, ResultCollector> {
    controller_with(records, &station_config())
}

pub fn controller_with(
    records: Vec<TestRecord>,
    config: &StationConfig,
) -> SequenceController<InMemoryLimitsProvider, ResultCollector> {
    let limits = InMemoryLimitsProvider::new().with_tests(DASH, TEST_TYPE, records);
    SequenceController::new(limits, ResultCollector::new(), config)
}
