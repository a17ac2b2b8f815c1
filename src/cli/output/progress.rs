//! Progress reporting with indicatif while a sequence runs.

use indicatif::{ProgressBar, ProgressStyle};

use crate::domain::models::{DiagnosticRecord, StepRecord};
use crate::domain::ports::ResultSink;

const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";
const PROGRESS_CHARS: &str = "█▓▒░ ";

/// Progress bar sized for `total` steps; hidden when `visible` is false.
pub fn create_progress_bar(total: u64, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars(PROGRESS_CHARS);
    pb.set_style(style);
    pb
}

pub trait ProgressBarExt {
    /// Finish with a success message (green checkmark)
    fn finish_success(&self, message: impl Into<String>);

    /// Finish with an error message (red X)
    fn finish_error(&self, message: impl Into<String>);
}

impl ProgressBarExt for ProgressBar {
    fn finish_success(&self, message: impl Into<String>) {
        self.finish_with_message(format!("✓ {}", message.into()));
    }

    fn finish_error(&self, message: impl Into<String>) {
        self.abandon_with_message(format!("✗ {}", message.into()));
    }
}

/// Result sink that advances a progress bar for every recorded step and
/// forwards the records to the wrapped sink.
pub struct ProgressSink<S: ResultSink> {
    inner: S,
    bar: ProgressBar,
}

impl<S: ResultSink> ProgressSink<S> {
    pub const fn new(inner: S, bar: ProgressBar) -> Self {
        Self { inner, bar }
    }

    pub const fn bar(&self) -> &ProgressBar {
        &self.bar
    }

    pub const fn inner(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: ResultSink> ResultSink for ProgressSink<S> {
    fn record_step(&mut self, record: StepRecord) {
        let verdict = if record.passed { "pass" } else { "FAIL" };
        self.bar.set_message(format!("{} {verdict}", record.name));
        self.bar.inc(1);
        self.inner.record_step(record);
    }

    fn record_diagnostic(&mut self, record: DiagnosticRecord) {
        self.inner.record_diagnostic(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::ErrorCode;
    use crate::domain::models::{Limits, ScaledValue, Units};
    use crate::services::ResultCollector;

    fn record(name: &str, passed: bool) -> StepRecord {
        StepRecord {
            test_number: 1,
            name: name.to_string(),
            software_name: "VOUT".to_string(),
            output: 1,
            value: ScaledValue::new(5.0, 2),
            limits: Limits::parse("4.90", "5.10").unwrap(),
            units: Units::Volts,
            passed,
            error_code: ErrorCode::NoDutError,
            message: None,
            from_cache: false,
            timestamp: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_progress_sink_forwards_and_counts() {
        let mut sink = ProgressSink::new(ResultCollector::new(), create_progress_bar(2, false));
        sink.record_step(record("VOUT1", true));
        sink.record_step(record("VOUT2", false));

        assert_eq!(sink.bar().position(), 2);
        let collector = sink.into_inner();
        assert_eq!(collector.steps().len(), 2);
        assert_eq!(collector.summary().failed, 1);
    }
}
