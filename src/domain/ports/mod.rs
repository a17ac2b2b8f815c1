//! Port trait definitions (Hexagonal Architecture)
//!
//! Interfaces the core drives and adapters implement:
//! - Instrument facades and the `InstrumentRack` context
//! - `LimitsProvider`: ordered test records per dash and test type
//! - `ResultSink`: per-step outcomes and diagnostic measurements

pub mod instruments;
pub mod limits_provider;
pub mod result_sink;

pub use instruments::{
    check_instrument, Coupling, Dmm, DmmFunction, ElectronicLoad, FunctionGenerator, Instrument,
    InstrumentRack, Oscilloscope, PowerSupply, RelayMatrix, ScopeMeasurement,
    TemperatureController, Trigger, TriggerMode,
};
pub use limits_provider::LimitsProvider;
pub use result_sink::ResultSink;
