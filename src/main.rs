//! ecfjob: task wrapper and job tooling for ecFlow suites.
//!
//! This is the main entry point for the `ecfjob` CLI. It parses arguments,
//! dispatches to the appropriate command handler, and handles errors with
//! proper exit codes.

mod cli;
mod commands;
pub mod cleanup;
pub mod config;
pub mod context;
pub mod directives;
pub mod environment;
pub mod error;
pub mod events;
pub mod exit_codes;
pub mod forecast;
pub mod lifecycle;
pub mod notify;
pub mod resolver;
pub mod template;

#[cfg(test)]
mod test_support;

use cli::Cli;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match commands::dispatch(cli.command) {
        // Task statuses outside 0..=255 cannot be reported as-is
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
