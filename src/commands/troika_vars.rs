//! Implementation of the `ecfjob troika-vars` command.

use crate::cli::TroikaVarsArgs;
use crate::config::{Config, DestinationFallback};
use crate::directives::{edit_lines, troika_vars};
use crate::error::Result;

/// Execute the `ecfjob troika-vars` command.
///
/// Prints ecFlow `edit` lines for the job manager and, with `--dest`, for
/// one job destination.
pub fn cmd_troika_vars(args: TroikaVarsArgs) -> Result<()> {
    let config = Config::load(&args.config)?;
    for line in troika_edit_lines(&config, args.dest.as_deref(), args.fallback.as_deref())? {
        println!("{}", line);
    }
    Ok(())
}

fn troika_edit_lines(
    config: &Config,
    dest: Option<&str>,
    fallback: Option<&str>,
) -> Result<Vec<String>> {
    let mut vars = troika_vars(&config.manager);
    if let Some(dest) = dest {
        let fallback = fallback.map(DestinationFallback::parse);
        vars.extend(config.destination(dest, fallback.as_ref())?);
    }
    Ok(edit_lines(&vars))
}
