//! Command implementations for ecfjob.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Handlers return the process exit status: 0 for every
//! command except `run`, which exits with the wrapped task's own status.

mod env;
mod notify;
mod render;
mod resolve_config;
mod run;
mod troika_vars;

use crate::cli::Command;
use crate::context::{VarMap, env_vars};
use crate::directives::SlurmDirectives;
use crate::error::Result;
use crate::exit_codes;
use crate::notify::DEFAULT_CLIENT;

/// Variable naming the `ecflow_client` command when `--client` is not given.
pub const CLIENT_VAR: &str = "ECFJOB_CLIENT";

/// Dispatch a command to its implementation.
///
/// This is the main entry point for command execution. Each command
/// is routed to its handler function.
pub fn dispatch(command: Command) -> Result<i32> {
    match command {
        Command::Run(args) => run::cmd_run(args),
        Command::ResolveConfig(args) => succeed(resolve_config::cmd_resolve_config(args)),
        Command::Render(args) => succeed(render::cmd_render(args)),
        Command::Directives => succeed(cmd_directives()),
        Command::TroikaVars(args) => succeed(troika_vars::cmd_troika_vars(args)),
        Command::Env(args) => succeed(env::cmd_env(args)),
        Command::Notify(cmd) => succeed(notify::cmd_notify(cmd)),
    }
}

fn succeed(result: Result<()>) -> Result<i32> {
    result.map(|()| exit_codes::SUCCESS)
}

/// Execute the `ecfjob directives` command.
fn cmd_directives() -> Result<()> {
    let directives = SlurmDirectives::from_vars(&env_vars())?;
    print!("{}", directives.render());
    Ok(())
}

/// The `ecflow_client` command to use: `--client`, then [`CLIENT_VAR`],
/// then [`DEFAULT_CLIENT`].
pub(crate) fn client_command(explicit: Option<&str>, vars: &VarMap) -> String {
    explicit
        .map(str::to_string)
        .or_else(|| vars.get(CLIENT_VAR).filter(|v| !v.is_empty()).cloned())
        .unwrap_or_else(|| DEFAULT_CLIENT.to_string())
}
