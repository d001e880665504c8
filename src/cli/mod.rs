//! CLI argument parsing for ecfjob.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ecfjob: task wrapper and job tooling for ecFlow suites.
///
/// Runs task bodies with exactly-once start/finish notifications to the
/// ecFlow server, fetches the suite's deploy config, builds the task
/// environment, and renders job scripts and batch directives.
#[derive(Parser, Debug)]
#[command(name = "ecfjob")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for ecfjob.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a task body under the lifecycle wrapper.
    ///
    /// Sends `init`, resolves the deploy config, builds the task
    /// environment, runs the command, cleans up temporary directories and
    /// sends exactly one `complete` or `abort`. Exits with the task's status.
    Run(RunArgs),

    /// Make the deploy config available locally and print its path.
    ///
    /// Copies the config from its source host only if it is not already
    /// readable here.
    ResolveConfig(ResolveConfigArgs),

    /// Render a job script.
    ///
    /// Expands deploy-time blocks (with --config) and then ecFlow
    /// `%VAR%` references and `%include` directives.
    Render(RenderArgs),

    /// Print the SLURM directives for the current job.
    ///
    /// Reads ECF_JOBOUT, TASK, QUEUE, ACCOUNT, STHOST and optional
    /// FAMILY1, MEM, NCPUS, SCRATCH_SIZE from the environment.
    Directives,

    /// Print the ecFlow variables that route jobs through troika.
    TroikaVars(TroikaVarsArgs),

    /// Print the task environment as shell `export` lines.
    Env(EnvArgs),

    /// Send a single notification to the ecFlow server.
    Notify(NotifyCommand),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Host the deploy config lives on (defaults to DEPLOY_CONFIG_HOST,
    /// then this machine).
    #[arg(long)]
    pub config_host: Option<String>,

    /// Path of the deploy config on its host (defaults to DEPLOY_CONFIG_PATH).
    #[arg(long)]
    pub config_path: Option<PathBuf>,

    /// Keep TMPDIR and SCRATCHDIR when the task ends.
    #[arg(long)]
    pub no_cleanup: bool,

    /// ecflow_client command (defaults to ECFJOB_CLIENT, then the deploy
    /// config's `ecflow.client`).
    #[arg(long)]
    pub client: Option<String>,

    /// Task command and its arguments, after `--`.
    #[arg(last = true, required = true)]
    pub command: Vec<String>,
}

/// Arguments for the `resolve-config` command.
#[derive(Parser, Debug)]
pub struct ResolveConfigArgs {
    /// Host the deploy config lives on (defaults to this machine).
    #[arg(long)]
    pub host: Option<String>,

    /// Path of the deploy config on its host.
    #[arg(long)]
    pub path: PathBuf,

    /// Directory to copy the config into (defaults to the current directory).
    #[arg(long)]
    pub dest: Option<PathBuf>,
}

/// Arguments for the `render` command.
#[derive(Parser, Debug)]
pub struct RenderArgs {
    /// Script to render.
    pub script: PathBuf,

    /// Include directory, searched in order (defaults to the script's directory).
    #[arg(short = 'I', long = "include")]
    pub include: Vec<PathBuf>,

    /// ecFlow variable as NAME=VALUE (repeatable).
    #[arg(long = "var", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,

    /// Deploy config used for `<?...?>` blocks.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Only expand deploy-time blocks; leave `%VAR%` references alone.
    #[arg(long, requires = "config")]
    pub deploy_only: bool,

    /// Write the result here instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Arguments for the `troika-vars` command.
#[derive(Parser, Debug)]
pub struct TroikaVarsArgs {
    /// Deploy config to read.
    #[arg(long)]
    pub config: PathBuf,

    /// Destination whose variables to add.
    #[arg(long)]
    pub dest: Option<String>,

    /// What to do when the destination is not configured: `parent` to add
    /// nothing, or the name of another destination.
    #[arg(long, requires = "dest")]
    pub fallback: Option<String>,
}

/// Arguments for the `env` command.
#[derive(Parser, Debug)]
pub struct EnvArgs {
    /// Deploy config to take suite settings from (defaults to CO_CONFIG_PATH).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Notify subcommands.
#[derive(Parser, Debug)]
pub struct NotifyCommand {
    /// ecflow_client command (defaults to ECFJOB_CLIENT, then ecflow_client).
    #[arg(long, global = true)]
    pub client: Option<String>,

    #[command(subcommand)]
    pub action: NotifyAction,
}

/// Available notifications.
#[derive(Subcommand, Debug)]
pub enum NotifyAction {
    /// Report that the task started.
    Init {
        /// Process id to report (defaults to the parent process).
        #[arg(long)]
        pid: Option<u32>,
    },

    /// Report that the task finished successfully.
    Complete,

    /// Report that the task failed.
    Abort {
        /// Reason shown in the ecFlow UI.
        #[arg(long)]
        reason: Option<String>,
    },

    /// Set a task event.
    Event {
        name: String,
    },

    /// Update a task meter.
    Meter {
        name: String,
        #[arg(allow_hyphen_values = true)]
        value: i64,
    },

    /// Update a task label.
    Label {
        name: String,
        /// Label text; several words are joined with spaces.
        #[arg(num_args = 1.., required = true)]
        text: Vec<String>,
    },
}

/// Parse a `NAME=VALUE` pair.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("expected NAME=VALUE, got '{}'", s)),
    }
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_debug_assert() {
        // Verifies the CLI arguments configuration is valid
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_run() {
        let cli = Cli::try_parse_from([
            "ecfjob",
            "run",
            "--config-host",
            "deployhost",
            "--config-path",
            "/home/f/geoglows.yaml",
            "--",
            "python",
            "run_rapid.py",
            "--member",
            "3",
        ])
        .unwrap();

        if let Command::Run(args) = cli.command {
            assert_eq!(args.config_host.as_deref(), Some("deployhost"));
            assert_eq!(args.config_path, Some(PathBuf::from("/home/f/geoglows.yaml")));
            assert!(!args.no_cleanup);
            assert_eq!(args.command, vec!["python", "run_rapid.py", "--member", "3"]);
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn parse_run_requires_command() {
        assert!(Cli::try_parse_from(["ecfjob", "run"]).is_err());
    }

    #[test]
    fn parse_resolve_config() {
        let cli =
            Cli::try_parse_from(["ecfjob", "resolve-config", "--path", "/c/geoglows.yaml"]).unwrap();
        if let Command::ResolveConfig(args) = cli.command {
            assert_eq!(args.path, PathBuf::from("/c/geoglows.yaml"));
            assert!(args.host.is_none());
        } else {
            panic!("Expected ResolveConfig command");
        }
    }

    #[test]
    fn parse_render() {
        let cli = Cli::try_parse_from([
            "ecfjob",
            "render",
            "run_rapid.ecf",
            "-I",
            "include",
            "-I",
            "common",
            "--var",
            "QUEUE=nf",
            "--var",
            "EMPTY=",
        ])
        .unwrap();

        if let Command::Render(args) = cli.command {
            assert_eq!(args.include, vec![PathBuf::from("include"), PathBuf::from("common")]);
            assert_eq!(
                args.vars,
                vec![
                    ("QUEUE".to_string(), "nf".to_string()),
                    ("EMPTY".to_string(), String::new())
                ]
            );
            assert!(args.config.is_none());
        } else {
            panic!("Expected Render command");
        }
    }

    #[test]
    fn parse_render_rejects_bad_var() {
        assert!(Cli::try_parse_from(["ecfjob", "render", "x.ecf", "--var", "NOEQUALS"]).is_err());
        assert!(Cli::try_parse_from(["ecfjob", "render", "x.ecf", "--deploy-only"]).is_err());
    }

    #[test]
    fn parse_troika_vars() {
        let cli = Cli::try_parse_from([
            "ecfjob",
            "troika-vars",
            "--config",
            "c.yaml",
            "--dest",
            "hpc",
            "--fallback",
            "parent",
        ])
        .unwrap();
        if let Command::TroikaVars(args) = cli.command {
            assert_eq!(args.dest.as_deref(), Some("hpc"));
            assert_eq!(args.fallback.as_deref(), Some("parent"));
        } else {
            panic!("Expected TroikaVars command");
        }
    }

    #[test]
    fn parse_notify() {
        let cli = Cli::try_parse_from(["ecfjob", "notify", "meter", "step", "-1"]).unwrap();
        if let Command::Notify(cmd) = cli.command {
            assert!(matches!(cmd.action, NotifyAction::Meter { value: -1, .. }));
        } else {
            panic!("Expected Notify command");
        }

        let cli = Cli::try_parse_from([
            "ecfjob", "notify", "label", "info", "member", "03", "--client", "/bin/ec",
        ])
        .unwrap();
        if let Command::Notify(cmd) = cli.command {
            assert_eq!(cmd.client.as_deref(), Some("/bin/ec"));
            match cmd.action {
                NotifyAction::Label { name, text } => {
                    assert_eq!(name, "info");
                    assert_eq!(text, vec!["member", "03"]);
                }
                other => panic!("Expected Label, got {:?}", other),
            }
        } else {
            panic!("Expected Notify command");
        }

        let cli = Cli::try_parse_from(["ecfjob", "notify", "abort", "--reason", "no data"]).unwrap();
        if let Command::Notify(cmd) = cli.command {
            assert!(matches!(cmd.action, NotifyAction::Abort { reason: Some(_) }));
        } else {
            panic!("Expected Notify command");
        }
    }

    #[test]
    fn parse_key_val_cases() {
        assert_eq!(
            parse_key_val("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert!(parse_key_val("=x").is_err());
    }
}
