//! Output formatting for CLI commands.

pub mod progress;

use serde::Serialize;

pub use progress::{create_progress_bar, ProgressBarExt, ProgressSink};

/// A command result that renders either for an operator or as JSON.
pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!(
            "{}",
            serde_json::to_string_pretty(&result.to_json()).unwrap_or_default()
        );
    } else {
        println!("{}", result.to_human());
    }
}

/// Whether stdout is a terminal that renders colour.
pub fn use_colors() -> bool {
    console::Term::stdout().features().colors_supported()
}
