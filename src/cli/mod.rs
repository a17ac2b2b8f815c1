//! Command-line interface for the `teststation` binary.

pub mod commands;
pub mod output;
pub mod types;

use std::process::ExitCode;

use anyhow::Result;

use crate::domain::models::StationConfig;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
pub use types::{Cli, Commands};

/// Exit code for a DUT that failed its sequence.
pub const EXIT_DUT_FAILED: u8 = 1;
/// Exit code for a station, configuration or input error.
pub const EXIT_STATION_ERROR: u8 = 2;

/// Load configuration for `cli`, honouring `--config`.
pub fn load_config(cli: &Cli) -> Result<StationConfig> {
    match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Install logging from the configuration. Stdout stays free of log lines
/// in JSON mode.
pub fn init_logging(config: &StationConfig, json_mode: bool) -> Result<LoggerImpl> {
    let mut log_config = LogConfig::try_from(&config.logging)?;
    if json_mode {
        log_config.enable_stdout = false;
    }
    LoggerImpl::init(&log_config)
}

/// Dispatch a parsed command line.
pub fn execute(cli: Cli) -> Result<ExitCode> {
    let config = load_config(&cli)?;
    let _logger = init_logging(&config, cli.json)?;

    match cli.command {
        Commands::Run(args) => {
            let passed = commands::run::execute(args, config, cli.json)?;
            Ok(if passed {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(EXIT_DUT_FAILED)
            })
        }
        Commands::Check(args) => {
            commands::check::execute(args, config, cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Types => {
            commands::types::execute(cli.json)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Report a command failure on stderr (or as JSON) and pick the exit code.
pub fn handle_error(err: &anyhow::Error, json_mode: bool) -> ExitCode {
    if json_mode {
        let chain: Vec<String> = err.chain().map(ToString::to_string).collect();
        println!(
            "{}",
            serde_json::json!({ "success": false, "error": err.to_string(), "causes": chain })
        );
    } else {
        eprintln!("{} {err:#}", console::style("error:").red().bold());
    }
    ExitCode::from(EXIT_STATION_ERROR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_run_command() {
        let cli = Cli::try_parse_from([
            "teststation",
            "run",
            "--limits",
            "limits.yaml",
            "--dash",
            "1234-01",
            "--stop-on-failure",
            "--no-speedup",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Run(args) => {
                assert_eq!(args.selection.dash.as_deref(), Some("1234-01"));
                assert!(args.stop_on_failure);
                assert!(args.no_speedup);
                assert!(!args.no_archive);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_check_requires_limits() {
        assert!(Cli::try_parse_from(["teststation", "check"]).is_err());
        let cli = Cli::try_parse_from([
            "teststation",
            "--config",
            "station.yaml",
            "check",
            "-l",
            "limits.yaml",
            "-t",
            "burnin",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("station.yaml")));
        assert!(matches!(cli.command, Commands::Check(ref args) if args.selection.test_type.as_deref() == Some("burnin")));
    }

    #[test]
    fn test_parse_types() {
        let cli = Cli::try_parse_from(["teststation", "types"]).unwrap();
        assert!(matches!(cli.command, Commands::Types));
    }
}
