//! Test station: test sequencing and measurement orchestration for DC-DC
//! converters.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): scaled values, test steps, the fault
//!   taxonomy and the instrument, limits and result ports
//! - **Service Layer** (`services`): measurement protocol, strategies,
//!   registry, speed-up cache, diagnostics and the sequence controller
//! - **Adapters** (`adapters`): simulated instruments, instrument factory,
//!   limits providers
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): the `teststation` binary
//!
//! # Example
//!
//! ```
//! use teststation::adapters::instruments::SimBench;
//! use teststation::adapters::limits::InMemoryLimitsProvider;
//! use teststation::domain::models::{ProtocolConfig, StationConfig, TestRecord};
//! use teststation::services::{ResultCollector, SequenceController};
//!
//! let mut config = StationConfig::default();
//! config.sequence.dash = "1234-01".to_string();
//! config.protocol = ProtocolConfig::immediate();
//!
//! let limits = InMemoryLimitsProvider::new().with_tests(
//!     "1234-01",
//!     "FINAL",
//!     vec![TestRecord::new("VOUTDC")
//!         .param("OUTPUT", "1")
//!         .param("VIN", "48")
//!         .param("LOAD", "2.0")
//!         .param("MIN", "4.90")
//!         .param("MAX", "5.10")
//!         .param("UNITS", "V")],
//! );
//!
//! let bench = SimBench::new();
//! let mut rack = bench.rack();
//! let mut sequence = SequenceController::new(limits, ResultCollector::new(), &config);
//! sequence.synchronize(&mut rack)?;
//! assert!(sequence.perform_sequence(&mut rack)?);
//! # Ok::<(), teststation::StationError>(())
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DutFault, ErrorCode, FaultKind, StationError, StationResult};
pub use domain::models::{
    Limits, LoggingConfig, ScaledValue, SequenceConfig, SequenceState, StationConfig, StepRecord,
    TestRecord, TestStep, Units,
};
pub use domain::ports::{InstrumentRack, LimitsProvider, ResultSink};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{MeasurementRegistry, ResultCollector, SequenceController};
