//! Test sequencing and measurement services.

pub mod diagnostics;
pub mod measurement;
pub mod protocol;
pub mod registry;
pub mod results;
pub mod sequence;
pub mod speedup;

pub use diagnostics::{
    default_diagnostics, run_diagnostics, DiagnosticOutcome, OrientationCheck,
    PowerConnectionCheck, PreTestDiagnostic,
};
pub use measurement::{Axes, Measurement};
pub use protocol::{finalize, MeasurementProtocol};
pub use registry::{MeasurementFactory, MeasurementRegistry};
pub use results::{ResultCollector, ResultSummary, SequenceArchive};
pub use sequence::SequenceController;
pub use speedup::SpeedupCache;
