//! Implementation of the `ecfjob env` command.

use crate::cli::EnvArgs;
use crate::context::TaskContext;
use crate::environment::TaskEnvironment;
use crate::error::Result;
use crate::resolver::{CONFIG_PATH_VAR, ResolvedConfig};
use std::path::{Path, PathBuf};

/// Execute the `ecfjob env` command.
///
/// Prints the task environment as `export` lines, for job scripts that run
/// their body in the same shell: `eval "$(ecfjob env)"`.
pub fn cmd_env(args: EnvArgs) -> Result<()> {
    let ctx = TaskContext::from_env()?;
    print!("{}", exports(&ctx, args.config.as_deref())?);
    Ok(())
}

fn exports(ctx: &TaskContext, config: Option<&Path>) -> Result<String> {
    let config_path = config
        .map(Path::to_path_buf)
        .or_else(|| ctx.get(CONFIG_PATH_VAR).map(PathBuf::from));

    let env = match config_path {
        Some(path) => {
            let resolved = ResolvedConfig {
                path,
                fetched: false,
            };
            let (_, config) = resolved.read()?;
            TaskEnvironment::build(ctx, Some(&config), Some(&resolved))?
        }
        None => TaskEnvironment::build(ctx, None, None)?,
    };
    Ok(env.to_exports())
}
