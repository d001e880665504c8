//! Implementation of the `ecfjob render` command.
//!
//! Rendering happens in two passes, the same order as a deployment followed
//! by job generation on the server: deploy-time `<?...?>`, `<!...!>` and
//! `<&...&>` blocks first (only with `--config`), then ecFlow `%` variables
//! and include directives.

use crate::cli::RenderArgs;
use crate::config::Config;
use crate::context::VarMap;
use crate::error::{EcfjobError, Result};
use crate::template::{DeployTemplate, IncludePath, Preprocessor};
use std::path::PathBuf;

/// Execute the `ecfjob render` command.
pub fn cmd_render(args: RenderArgs) -> Result<()> {
    let rendered = render(&args)?;

    match &args.output {
        Some(path) => std::fs::write(path, rendered).map_err(|e| {
            EcfjobError::UserError(format!("failed to write '{}': {}", path.display(), e))
        }),
        None => {
            print!("{}", rendered);
            Ok(())
        }
    }
}

fn render(args: &RenderArgs) -> Result<String> {
    let includes = IncludePath::new(include_dirs(args));
    let vars: VarMap = args.vars.iter().cloned().collect();
    let preprocessor = Preprocessor::new(&vars, &includes);

    let Some(config_path) = &args.config else {
        return Ok(preprocessor.process_file(&args.script)?);
    };

    let config = Config::load(config_path)?;
    let deployed = DeployTemplate::new(Some(&config), &includes).render_file(&args.script)?;
    if args.deploy_only {
        return Ok(deployed);
    }
    Ok(preprocessor.process_str(&deployed, &args.script.display().to_string())?)
}

/// `-I` directories, or the script's own directory when none are given.
fn include_dirs(args: &RenderArgs) -> Vec<PathBuf> {
    if !args.include.is_empty() {
        return args.include.clone();
    }
    match args.script.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => vec![dir.to_path_buf()],
        _ => vec![PathBuf::from(".")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use tempfile::TempDir;

    fn render_args(script: &Path) -> RenderArgs {
        RenderArgs {
            script: script.to_path_buf(),
            include: Vec::new(),
            vars: vec![
                ("QUEUE".to_string(), "nf".to_string()),
                ("TASK".to_string(), "run_rapid".to_string()),
            ],
            config: None,
            deploy_only: false,
            output: None,
        }
    }

    #[test]
    fn test_includes_default_to_script_dir() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("head.h"), "# queue %QUEUE%\n").unwrap();
        let script = temp_dir.path().join("run_rapid.ecf");
        std::fs::write(&script, "%include <head.h>\necho %TASK%\n").unwrap();

        let out = render(&render_args(&script)).unwrap();

        assert_eq!(out, "# queue nf\necho run_rapid\n");
    }

    #[test]
    fn test_deploy_blocks_then_ecflow_vars() {
        let temp_dir = TempDir::new().unwrap();
        let config = temp_dir.path().join("geoglows.yaml");
        std::fs::write(&config, "workroot: /work/geoglows\n").unwrap();
        let script = temp_dir.path().join("run_rapid.ecf");
        std::fs::write(
            &script,
            "suite_dir=<?config.get('workroot')?>\nqueue=%QUEUE%\n",
        )
        .unwrap();

        let mut args = render_args(&script);
        args.config = Some(config);
        assert_eq!(
            render(&args).unwrap(),
            "suite_dir=/work/geoglows\nqueue=nf\n"
        );

        args.deploy_only = true;
        assert_eq!(
            render(&args).unwrap(),
            "suite_dir=/work/geoglows\nqueue=%QUEUE%\n"
        );
    }

    #[test]
    fn test_undefined_variable_is_template_error() {
        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("run_rapid.ecf");
        std::fs::write(&script, "echo %ACCOUNT%\n").unwrap();

        let err = render(&render_args(&script)).unwrap_err();

        assert!(matches!(err, EcfjobError::TemplateError(_)));
        assert!(err.to_string().contains("ACCOUNT"));
    }

    #[test]
    fn test_output_file() {
        let temp_dir = TempDir::new().unwrap();
        let script = temp_dir.path().join("run_rapid.ecf");
        std::fs::write(&script, "qos=%QUEUE%\n").unwrap();
        let output = temp_dir.path().join("run_rapid.job1");

        let mut args = render_args(&script);
        args.output = Some(output.clone());
        cmd_render(args).unwrap();

        assert_eq!(std::fs::read_to_string(output).unwrap(), "qos=nf\n");
    }
}
