//! CLI type definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::check::CheckArgs;
use super::commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "teststation")]
#[command(about = "DC-DC converter test station", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file used instead of .teststation/config.yaml
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a part's test sequence on the instrument rack
    Run(RunArgs),

    /// Load and validate a part's test list without hardware
    Check(CheckArgs),

    /// List registered measurement types
    Types,
}
