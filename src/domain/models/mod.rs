pub mod conditions;
pub mod config;
pub mod measurement;
pub mod results;
pub mod scaled;
pub mod sequence;
pub mod test_step;
pub mod units;

pub use conditions::{
    Bandwidth, Conditions, LineCondition, LoadCondition, LoadMode, OutputChannel, RelayId,
    SetupKey, Setpoint, SyncSignal,
};
pub use config::{
    DiagnosticsConfig, InstrumentsConfig, LoggingConfig, ProtocolConfig, ResultsConfig,
    SequenceConfig, StationConfig,
};
pub use measurement::{ExtraMeasurement, Measured};
pub use results::{DiagnosticRecord, StepRecord, DIAGNOSTIC_FAILURE_TEST};
pub use scaled::{Limits, ScaledValue};
pub use sequence::SequenceState;
pub use test_step::{TestName, TestRecord, TestStep};
pub use units::Units;
