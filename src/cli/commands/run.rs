//! Implementation of the `teststation run` command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::error;

use super::SelectionArgs;
use crate::adapters::instruments::InstrumentFactory;
use crate::adapters::limits::YamlLimitsProvider;
use crate::cli::output::{create_progress_bar, output, use_colors, CommandOutput, ProgressBarExt, ProgressSink};
use crate::domain::errors::StationResult;
use crate::domain::models::StationConfig;
use crate::domain::ports::{InstrumentRack, LimitsProvider};
use crate::infrastructure::config::ConfigLoader;
use crate::services::{ResultCollector, SequenceArchive, SequenceController};

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    /// Stop at the first failing step
    #[arg(long)]
    pub stop_on_failure: bool,

    /// Measure every step on hardware, even with identical conditions
    #[arg(long)]
    pub no_speedup: bool,

    /// Do not write the JSON result archive
    #[arg(long)]
    pub no_archive: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut StationConfig) {
        self.selection.apply(&mut config.sequence);
        if self.stop_on_failure {
            config.sequence.stop_on_first_failure = true;
        }
        if self.no_speedup {
            config.sequence.speedup_enabled = false;
        }
        if self.no_archive {
            config.results.archive = false;
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    #[serde(flatten)]
    pub archive: SequenceArchive,
    pub cache_hits: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic_failure: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,
    #[serde(skip)]
    pub table: String,
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let summary = &self.archive.summary;
        let mut lines = vec![self.table.clone()];
        if let Some(reason) = &self.diagnostic_failure {
            lines.push(format!("Pre-test diagnostics failed: {reason}"));
        }
        lines.push(format!(
            "{} {} : {}  ({} passed, {} failed, {} from cache)",
            self.archive.dash,
            self.archive.test_type,
            if self.archive.passed { "PASS" } else { "FAIL" },
            summary.passed,
            summary.failed,
            summary.from_cache,
        ));
        if let Some(path) = &self.archive_path {
            lines.push(format!("Results archived to {}", path.display()));
        }
        lines.join("\n")
    }
}

/// Run the selected sequence. Returns the DUT verdict.
pub fn execute(args: RunArgs, mut config: StationConfig, json_mode: bool) -> Result<bool> {
    args.apply(&mut config);
    ConfigLoader::validate(&config)?;

    let limits = YamlLimitsProvider::open(&args.selection.limits)?;
    let factory = InstrumentFactory::new(&config.instruments);
    let mut rack = factory.build(&config.instruments)?;
    if let Err(err) = rack.initialize_all() {
        rack.emergency_shutdown();
        return Err(err).context("instrument initialization failed");
    }

    let sink = ProgressSink::new(ResultCollector::new(), create_progress_bar(0, !json_mode));
    let mut controller = SequenceController::new(limits, sink, &config);

    let passed = match run_sequence(&mut controller, &mut rack) {
        Ok(passed) => {
            rack.power_down();
            passed
        }
        Err(err) => {
            controller.sink().bar().finish_error(err.to_string());
            if err.is_fatal() {
                error!(error = %err, kind = %err.kind(), "sequence aborted by station fault");
                rack.emergency_shutdown();
            } else {
                rack.power_down();
            }
            return Err(err).context("sequence did not complete");
        }
    };

    let bar = controller.sink().bar();
    if passed {
        bar.finish_success("sequence passed");
    } else {
        bar.finish_error("sequence failed");
    }

    let cache_hits = controller.cache_hits();
    let diagnostic_failure = controller.diagnostic_failure().map(str::to_string);
    let collector = controller.into_sink().into_inner();
    let archive = collector.to_archive(&config.sequence.dash, &config.sequence.test_type, passed);
    let archive_path = if config.results.archive {
        Some(ResultCollector::write_archive(
            Path::new(&config.results.output_dir),
            &archive,
        )?)
    } else {
        None
    };

    let result = RunOutput {
        archive,
        cache_hits,
        diagnostic_failure,
        archive_path,
        table: collector.render_table(use_colors()),
    };
    output(&result, json_mode);
    Ok(passed)
}

fn run_sequence<L: LimitsProvider>(
    controller: &mut SequenceController<L, ProgressSink<ResultCollector>>,
    rack: &mut InstrumentRack,
) -> StationResult<bool> {
    let steps = controller.synchronize(rack)?;
    controller.sink().bar().set_length(steps as u64);
    controller.perform_sequence(rack)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: &str = r#"
parts:
  "1234-01":
    FINAL:
      - name: "VOUTDC = Main Output"
        parameters: { OUTPUT: 1, VIN: 48, LOAD: "2.0", MIN: "4.90", MAX: "5.10", UNITS: V }
      - name: "VOUTDC = Aux Output"
        parameters: { OUTPUT: 2, VIN: 48, LOAD: "2.0", MIN: "11.80", MAX: "12.20", UNITS: V }
"#;

    fn run_args(limits: &Path, no_archive: bool) -> RunArgs {
        RunArgs {
            selection: SelectionArgs {
                limits: limits.to_path_buf(),
                dash: Some("1234-01".to_string()),
                test_type: None,
            },
            stop_on_failure: false,
            no_speedup: false,
            no_archive,
        }
    }

    #[test]
    fn test_run_passes_and_archives() {
        let dir = tempfile::tempdir().unwrap();
        let limits = dir.path().join("limits.yaml");
        std::fs::write(&limits, LIMITS).unwrap();

        let mut config = StationConfig::default();
        config.protocol = crate::domain::models::ProtocolConfig::immediate();
        config.results.output_dir = dir.path().join("results").to_string_lossy().to_string();

        let passed = execute(run_args(&limits, false), config, true).unwrap();
        assert!(passed);

        let archives: Vec<_> = std::fs::read_dir(dir.path().join("results")).unwrap().collect();
        assert_eq!(archives.len(), 1);
    }

    #[test]
    fn test_run_missing_dash_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let limits = dir.path().join("limits.yaml");
        std::fs::write(&limits, LIMITS).unwrap();

        let mut args = run_args(&limits, true);
        args.selection.dash = Some("9999-99".to_string());
        let mut config = StationConfig::default();
        config.protocol = crate::domain::models::ProtocolConfig::immediate();

        assert!(execute(args, config, true).is_err());
    }

    #[test]
    fn test_args_override_config() {
        let args = RunArgs {
            selection: SelectionArgs {
                limits: PathBuf::from("limits.yaml"),
                dash: Some("42".to_string()),
                test_type: Some("BURNIN".to_string()),
            },
            stop_on_failure: true,
            no_speedup: true,
            no_archive: true,
        };
        let mut config = StationConfig::default();
        args.apply(&mut config);

        assert_eq!(config.sequence.dash, "42");
        assert_eq!(config.sequence.test_type, "BURNIN");
        assert!(config.sequence.stop_on_first_failure);
        assert!(!config.sequence.speedup_enabled);
        assert!(!config.results.archive);
    }
}
