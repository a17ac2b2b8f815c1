//! CLI command implementations.

pub mod check;
pub mod run;
pub mod types;

use std::path::PathBuf;

use clap::Args;

use crate::domain::models::SequenceConfig;

/// Limits file and test list selection shared by `run` and `check`.
#[derive(Args, Debug, Clone)]
pub struct SelectionArgs {
    /// YAML limits file
    #[arg(short, long)]
    pub limits: PathBuf,

    /// Part dash number (overrides sequence.dash)
    #[arg(short, long)]
    pub dash: Option<String>,

    /// Test type within the dash (overrides sequence.test_type)
    #[arg(short, long)]
    pub test_type: Option<String>,
}

impl SelectionArgs {
    pub fn apply(&self, sequence: &mut SequenceConfig) {
        if let Some(dash) = &self.dash {
            sequence.dash.clone_from(dash);
        }
        if let Some(test_type) = &self.test_type {
            sequence.test_type.clone_from(test_type);
        }
    }
}
