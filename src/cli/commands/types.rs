//! Implementation of the `teststation types` command.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::services::MeasurementRegistry;

#[derive(Debug, Serialize)]
pub struct TypesOutput {
    pub types: Vec<String>,
}

impl CommandOutput for TypesOutput {
    fn to_human(&self) -> String {
        let mut lines = vec![format!("{} measurement type(s):", self.types.len())];
        lines.extend(self.types.iter().map(|name| format!("  {name}")));
        lines.join("\n")
    }
}

pub fn execute(json_mode: bool) -> Result<()> {
    let registry = MeasurementRegistry::with_builtins();
    let result = TypesOutput {
        types: registry.names().into_iter().map(str::to_string).collect(),
    };
    output(&result, json_mode);
    Ok(())
}
