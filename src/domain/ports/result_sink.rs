//! Result sink port.

use crate::domain::models::{DiagnosticRecord, StepRecord};

/// Receiver of per-step outcomes and diagnostic measurements.
pub trait ResultSink {
    fn record_step(&mut self, record: StepRecord);

    fn record_diagnostic(&mut self, record: DiagnosticRecord);
}
