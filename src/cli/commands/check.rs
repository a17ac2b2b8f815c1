//! Implementation of the `teststation check` command.

use anyhow::Result;
use clap::Args;
use comfy_table::{presets, ContentArrangement, Table};
use serde::Serialize;

use super::SelectionArgs;
use crate::adapters::limits::YamlLimitsProvider;
use crate::cli::output::{output, CommandOutput};
use crate::domain::models::{StationConfig, TestStep};
use crate::services::{ResultCollector, SequenceController};

#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(Debug, Serialize)]
pub struct CheckedStep {
    pub index: usize,
    pub name: String,
    pub software_name: String,
    pub output: u8,
    pub limits: String,
    pub units: String,
    pub speedup: bool,
}

impl From<&TestStep> for CheckedStep {
    fn from(step: &TestStep) -> Self {
        Self {
            index: step.index(),
            name: step.display_name().to_string(),
            software_name: step.software_name().to_string(),
            output: step.output(),
            limits: step.limits().to_string(),
            units: step.units().to_string(),
            speedup: step.speedup_eligible(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CheckOutput {
    pub dash: String,
    pub test_type: String,
    pub steps: Vec<CheckedStep>,
}

impl CommandOutput for CheckOutput {
    fn to_human(&self) -> String {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["#", "Test", "Type", "Output", "Limits", "Units", "Speed-up"]);
        for step in &self.steps {
            table.add_row(vec![
                (step.index + 1).to_string(),
                step.name.clone(),
                step.software_name.clone(),
                step.output.to_string(),
                step.limits.clone(),
                step.units.clone(),
                if step.speedup { "yes" } else { "no" }.to_string(),
            ]);
        }
        format!(
            "{table}\n{} {}: {} step(s) valid",
            self.dash,
            self.test_type,
            self.steps.len()
        )
    }
}

pub fn execute(args: CheckArgs, mut config: StationConfig, json_mode: bool) -> Result<()> {
    args.selection.apply(&mut config.sequence);
    let limits = YamlLimitsProvider::open(&args.selection.limits)?;
    let controller = SequenceController::new(limits, ResultCollector::new(), &config);
    let steps = controller.preview()?;

    let result = CheckOutput {
        dash: config.sequence.dash,
        test_type: config.sequence.test_type,
        steps: steps.iter().map(CheckedStep::from).collect(),
    };
    output(&result, json_mode);
    Ok(())
}
