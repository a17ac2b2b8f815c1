//! In-memory result sink, operator table and JSON archive.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use comfy_table::{presets, Attribute, Cell, Color, ContentArrangement, Table};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::domain::errors::{StationError, StationResult};
use crate::domain::models::{DiagnosticRecord, StepRecord};
use crate::domain::ports::ResultSink;

const TABLE_WIDTH: u16 = 140;

/// Pass/fail counts over the recorded steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Steps whose value came from the speed-up cache.
    pub from_cache: usize,
    /// Failed steps carrying a fault message rather than a plain limit miss.
    pub errored: usize,
}

impl ResultSummary {
    pub const fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Everything archived for one sequence run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceArchive {
    pub run_id: Uuid,
    pub dash: String,
    pub test_type: String,
    pub finished_at: DateTime<Utc>,
    /// Overall sequence verdict, including diagnostic failures.
    pub passed: bool,
    pub summary: ResultSummary,
    pub steps: Vec<StepRecord>,
    pub diagnostics: Vec<DiagnosticRecord>,
}

impl SequenceArchive {
    /// File name: dash, test type, UTC timestamp and short run id.
    pub fn file_name(&self) -> String {
        let dash = file_component(&self.dash);
        let test_type = file_component(&self.test_type).to_ascii_lowercase();
        let run = self.run_id.simple().to_string();
        format!(
            "{}_{}_{}_{}.json",
            if dash.is_empty() { "nodash" } else { &dash },
            if test_type.is_empty() { "notype" } else { &test_type },
            self.finished_at.format("%Y%m%dT%H%M%SZ"),
            &run[..8]
        )
    }
}

/// Keep ASCII alphanumerics and `-`, replace everything else with `_`.
fn file_component(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Collects step and diagnostic records for one sequence.
#[derive(Debug, Default)]
pub struct ResultCollector {
    steps: Vec<StepRecord>,
    diagnostics: Vec<DiagnosticRecord>,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn steps(&self) -> &[StepRecord] {
        &self.steps
    }

    pub fn diagnostics(&self) -> &[DiagnosticRecord] {
        &self.diagnostics
    }

    pub fn clear(&mut self) {
        self.steps.clear();
        self.diagnostics.clear();
    }

    pub fn summary(&self) -> ResultSummary {
        let passed = self.steps.iter().filter(|s| s.passed).count();
        ResultSummary {
            total: self.steps.len(),
            passed,
            failed: self.steps.len() - passed,
            from_cache: self.steps.iter().filter(|s| s.from_cache).count(),
            errored: self.steps.iter().filter(|s| !s.passed && s.message.is_some()).count(),
        }
    }

    /// Step table for the operator console.
    pub fn render_table(&self, use_colors: bool) -> String {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(TABLE_WIDTH);
        table.set_header(
            ["#", "Test", "Out", "Value", "Limits", "Units", "Result", "Code"]
                .into_iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
        );

        for step in &self.steps {
            let verdict = match (step.passed, use_colors) {
                (true, true) => Cell::new("PASS").fg(Color::Green),
                (false, true) => Cell::new("FAIL").fg(Color::Red),
                (true, false) => Cell::new("PASS"),
                (false, false) => Cell::new("FAIL"),
            };
            let value = if step.from_cache {
                format!("{} *", step.value)
            } else {
                step.value.to_string()
            };
            table.add_row(vec![
                Cell::new(step.test_number),
                Cell::new(&step.name),
                Cell::new(step.output),
                Cell::new(value),
                Cell::new(step.limits),
                Cell::new(step.units),
                verdict,
                Cell::new(step.error_code),
            ]);
            if let Some(message) = &step.message {
                table.add_row(vec![
                    Cell::new(""),
                    Cell::new(message).add_attribute(Attribute::Italic),
                ]);
            }
        }
        table.to_string()
    }

    pub fn to_archive(&self, dash: &str, test_type: &str, passed: bool) -> SequenceArchive {
        SequenceArchive {
            run_id: Uuid::new_v4(),
            dash: dash.to_string(),
            test_type: test_type.to_string(),
            finished_at: Utc::now(),
            passed,
            summary: self.summary(),
            steps: self.steps.clone(),
            diagnostics: self.diagnostics.clone(),
        }
    }

    /// Write `archive` as pretty JSON into `dir`, creating it if needed.
    pub fn write_archive(dir: &Path, archive: &SequenceArchive) -> StationResult<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|err| {
            StationError::Archive(format!("cannot create {}: {err}", dir.display()))
        })?;
        let path = dir.join(archive.file_name());
        let json = serde_json::to_string_pretty(archive)
            .map_err(|err| StationError::Archive(format!("cannot encode archive: {err}")))?;
        std::fs::write(&path, json).map_err(|err| {
            StationError::Archive(format!("cannot write {}: {err}", path.display()))
        })?;
        info!(path = %path.display(), run_id = %archive.run_id, "sequence archived");
        Ok(path)
    }

    /// Read an archive written by [`Self::write_archive`].
    pub fn read_archive(path: &Path) -> StationResult<SequenceArchive> {
        let text = std::fs::read_to_string(path).map_err(|err| {
            StationError::Archive(format!("cannot read {}: {err}", path.display()))
        })?;
        serde_json::from_str(&text)
            .map_err(|err| StationError::Archive(format!("malformed archive {}: {err}", path.display())))
    }
}

impl ResultSink for ResultCollector {
    fn record_step(&mut self, record: StepRecord) {
        self.steps.push(record);
    }

    fn record_diagnostic(&mut self, record: DiagnosticRecord) {
        self.diagnostics.push(record);
    }
}
