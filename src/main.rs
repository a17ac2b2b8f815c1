//! Test station CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use teststation::cli::{execute, handle_error, Cli};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json = cli.json;

    match execute(cli) {
        Ok(code) => code,
        Err(err) => handle_error(&err, json),
    }
}
