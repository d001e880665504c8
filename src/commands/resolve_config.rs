//! Implementation of the `ecfjob resolve-config` command.

use crate::cli::ResolveConfigArgs;
use crate::context::machine_hostname;
use crate::error::{EcfjobError, Result};
use crate::resolver::{ConfigResolver, DeployConfigRef, RemoteCopier, ResolvedConfig, ScpCopier};
use std::path::PathBuf;

/// Execute the `ecfjob resolve-config` command.
///
/// Prints the local path of the deploy config, suitable for
/// `export CO_CONFIG_PATH=$(ecfjob resolve-config ...)`.
pub fn cmd_resolve_config(args: ResolveConfigArgs) -> Result<()> {
    let resolved = resolve(&args, ScpCopier::default())?;
    println!("{}", resolved.path.display());
    Ok(())
}

fn resolve<C: RemoteCopier>(args: &ResolveConfigArgs, copier: C) -> Result<ResolvedConfig> {
    let dest = match &args.dest {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().map_err(|e| {
            EcfjobError::UserError(format!("failed to get current working directory: {}", e))
        })?,
    };
    let reference = DeployConfigRef::new(
        args.host.clone().unwrap_or_else(machine_hostname),
        PathBuf::from(&args.path),
    );

    let resolved = ConfigResolver::new(copier, dest).resolve(&reference)?;
    if resolved.fetched {
        eprintln!(
            "Copied {}:{} to {}",
            reference.host,
            reference.path.display(),
            resolved.path.display()
        );
    }
    Ok(resolved)
}
