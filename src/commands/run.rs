//! Implementation of the `ecfjob run` command.
//!
//! Runs a task body the way every ecFlow job header does: report `init`,
//! fetch and echo the deploy config, export the suite environment, run the
//! body, then clean up and report exactly one `complete` or `abort`.

use crate::cli::RunArgs;
use crate::commands::client_command;
use crate::config::Config;
use crate::context::TaskContext;
use crate::environment::TaskEnvironment;
use crate::error::Result;
use crate::events::{Event, EventAction, EventLog};
use crate::lifecycle::{GuardOptions, RunOptions, TaskGuard, TaskOutcome, run_task};
use crate::notify::{EcflowClient, Orchestrator};
use crate::resolver::{ConfigResolver, DeployConfigRef, RemoteCopier, ScpCopier};
use serde_json::json;

/// Execute the `ecfjob run` command.
///
/// Returns the task's exit status. Errors are only returned when the task
/// could not be started at all (incomplete context, unusable client command).
pub fn cmd_run(args: RunArgs) -> Result<i32> {
    let ctx = TaskContext::from_env()?;
    let client = EcflowClient::new(
        &client_command(args.client.as_deref(), ctx.vars()),
        ctx.ecf(),
    )?;

    let outcome = execute(&args, &ctx, client, ScpCopier::default());
    Ok(outcome.exit_code)
}

pub(crate) fn execute<O: Orchestrator, C: RemoteCopier>(
    args: &RunArgs,
    ctx: &TaskContext,
    orchestrator: O,
    copier: C,
) -> TaskOutcome {
    let events = EventLog::for_context(ctx);
    let mut guard = TaskGuard::start(
        orchestrator,
        ctx,
        GuardOptions {
            cleanup: !args.no_cleanup,
            events: Some(events.clone()),
            ..GuardOptions::default()
        },
    );

    let (env, config) = match prepare(args, ctx, copier, &events) {
        Ok(prepared) => prepared,
        Err(e) => {
            eprintln!("Error: {}", e);
            return guard.abort(e.exit_code(), e.to_string());
        }
    };

    if let Some(config) = &config
        && let Err(e) = guard.orchestrator_mut().configure(&config.ecflow)
    {
        eprintln!("Error: {}", e);
        return guard.abort(e.exit_code(), e.to_string());
    }

    run_task(guard, &env, &args.command, &RunOptions::default())
}

/// Resolve and read the deploy config, then build the task environment.
fn prepare<C: RemoteCopier>(
    args: &RunArgs,
    ctx: &TaskContext,
    copier: C,
    events: &EventLog,
) -> Result<(TaskEnvironment, Option<Config>)> {
    let Some(reference) = DeployConfigRef::from_args_or_vars(
        args.config_host.as_deref(),
        args.config_path.as_deref(),
        ctx.vars(),
    ) else {
        eprintln!("Warning: no deploy config given; suite variables are not set");
        return Ok((TaskEnvironment::build(ctx, None, None)?, None));
    };

    let mut resolver = ConfigResolver::new(copier, ctx.workdir());
    let resolved = resolver.resolve(&reference)?;
    events.record(
        &Event::new(EventAction::ConfigResolved)
            .with_task(&ctx.ecf().name)
            .with_details(json!({
                "host": reference.host,
                "source": reference.path,
                "path": resolved.path,
                "fetched": resolved.fetched,
            })),
    );

    let (content, config) = resolved.read()?;
    print!("{}", content);
    if !content.ends_with('\n') {
        println!();
    }

    let env = TaskEnvironment::build(ctx, Some(&config), Some(&resolved))?;
    Ok((env, Some(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exit_codes;
    use crate::notify::TaskSignal;
    use crate::test_support::{RecordingCopier, RecordingOrchestrator, task_vars};
    use serial_test::serial;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    const CONFIG: &str = "workroot: /work/geoglows\n\
                          staticdata: /work/geoglows/static\n\
                          exparch: ec:/geoglows/arch\n\
                          iniexparch: ec:/geoglows/inits\n\
                          mode: TEST\n";

    fn context(workdir: &Path, extra: &[(&str, &str)]) -> TaskContext {
        let path = std::env::var("PATH").unwrap_or_default();
        let mut vars = vec![("PWD", workdir.to_str().unwrap()), ("PATH", path.as_str())];
        vars.extend_from_slice(extra);
        TaskContext::from_vars(task_vars(&vars)).unwrap()
    }

    fn args(config_path: Option<&Path>, command: &[&str]) -> RunArgs {
        RunArgs {
            config_host: Some("deployhost".to_string()),
            config_path: config_path.map(Path::to_path_buf),
            no_cleanup: false,
            client: None,
            command: command.iter().map(|w| w.to_string()).collect(),
        }
    }

    #[test]
    #[serial]
    fn test_local_config_is_not_copied() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("geoglows.yaml");
        std::fs::write(&config_path, CONFIG).unwrap();
        let ctx = context(temp_dir.path(), &[]);
        let recorder = RecordingOrchestrator::new();
        let mut copier = RecordingCopier::default();

        let script = format!(
            "test \"$CO_CONFIG_PATH\" = '{}' && test \"$suite_dir\" = /work/geoglows",
            config_path.display()
        );
        let outcome = execute(
            &args(Some(&config_path), &["sh", "-c", &script]),
            &ctx,
            recorder.clone(),
            &mut copier,
        );

        assert_eq!(outcome.exit_code, 0);
        assert!(copier.calls.is_empty());
        assert_eq!(
            recorder.sent(),
            vec![
                TaskSignal::Init {
                    pid: std::process::id()
                },
                TaskSignal::Complete
            ]
        );
    }

    #[test]
    #[serial]
    fn test_unreachable_config_is_copied_once() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(temp_dir.path(), &[]);
        let mut copier = RecordingCopier::with_content(CONFIG);
        let remote = PathBuf::from("/home/forecaster/suites/geoglows.yaml");
        let local = temp_dir.path().join("geoglows.yaml");

        let script = format!("test \"$CO_CONFIG_PATH\" = '{}'", local.display());
        let outcome = execute(
            &args(Some(&remote), &["sh", "-c", &script]),
            &ctx,
            RecordingOrchestrator::new(),
            &mut copier,
        );

        assert_eq!(outcome.exit_code, 0);
        assert_eq!(
            copier.calls,
            vec![("deployhost".to_string(), remote, local)]
        );

        let events = EventLog::for_context(&ctx).read_all().unwrap();
        let resolved = events
            .iter()
            .find(|e| e.action == EventAction::ConfigResolved)
            .unwrap();
        assert_eq!(resolved.details["fetched"], true);
    }

    #[test]
    #[serial]
    fn test_copy_failure_aborts_before_task_runs() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(temp_dir.path(), &[]);
        let recorder = RecordingOrchestrator::new();
        let marker = temp_dir.path().join("ran");

        let script = format!("touch '{}'", marker.display());
        let outcome = execute(
            &args(
                Some(Path::new("/home/forecaster/suites/geoglows.yaml")),
                &["sh", "-c", &script],
            ),
            &ctx,
            recorder.clone(),
            RecordingCopier::failing(),
        );

        assert_eq!(outcome.exit_code, exit_codes::REMOTE_COPY_FAILURE);
        assert!(!marker.exists());
        match recorder.terminal().as_slice() {
            [TaskSignal::Abort {
                reason: Some(reason),
            }] => assert!(reason.starts_with("Remote copy failed")),
            other => panic!("expected one abort with reason, got {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_invalid_config_aborts() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("geoglows.yaml");
        std::fs::write(&config_path, "mode: TEST\n").unwrap();
        let ctx = context(temp_dir.path(), &[]);
        let recorder = RecordingOrchestrator::new();

        let outcome = execute(
            &args(Some(&config_path), &["true"]),
            &ctx,
            recorder.clone(),
            RecordingCopier::default(),
        );

        assert_eq!(outcome.exit_code, exit_codes::CONFIG_FAILURE);
        assert_eq!(recorder.terminal().len(), 1);
    }

    #[test]
    #[serial]
    fn test_config_path_from_task_variables() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("geoglows.yaml");
        std::fs::write(&config_path, CONFIG).unwrap();
        let ctx = context(
            temp_dir.path(),
            &[("DEPLOY_CONFIG_PATH", config_path.to_str().unwrap())],
        );

        let mut run_args = args(None, &["sh", "-c", "test -n \"$CO_CONFIG_PATH\""]);
        run_args.config_host = None;
        let outcome = execute(
            &run_args,
            &ctx,
            RecordingOrchestrator::new(),
            RecordingCopier::default(),
        );

        assert_eq!(outcome.exit_code, 0);
    }

    #[test]
    #[serial]
    fn test_without_config_task_still_runs() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(temp_dir.path(), &[]);
        let recorder = RecordingOrchestrator::new();

        let outcome = execute(
            &args(None, &["sh", "-c", "test -z \"$CO_CONFIG_PATH\" && exit 4"]),
            &ctx,
            recorder.clone(),
            RecordingCopier::default(),
        );

        assert_eq!(outcome.exit_code, 4);
        assert_eq!(recorder.terminal(), vec![TaskSignal::Abort { reason: None }]);
    }

    #[test]
    #[serial]
    fn test_failed_init_still_runs_task() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(temp_dir.path(), &[]);
        let recorder = RecordingOrchestrator::unreachable_at_start();
        let marker = temp_dir.path().join("ran");

        let script = format!("touch '{}'", marker.display());
        let outcome = execute(
            &args(None, &["sh", "-c", &script]),
            &ctx,
            recorder.clone(),
            RecordingCopier::default(),
        );

        assert_eq!(outcome.exit_code, 0);
        assert!(marker.exists());
        assert_eq!(recorder.terminal(), vec![TaskSignal::Complete]);
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn test_signal_during_config_copy_aborts_before_task_runs() {
        let temp_dir = TempDir::new().unwrap();
        let ctx = context(temp_dir.path(), &[]);
        let recorder = RecordingOrchestrator::new();
        let marker = temp_dir.path().join("ran");

        let script = format!("touch '{}'", marker.display());
        let outcome = execute(
            &args(
                Some(Path::new("/home/forecaster/suites/geoglows.yaml")),
                &["sh", "-c", &script],
            ),
            &ctx,
            recorder.clone(),
            RecordingCopier::interrupted(CONFIG, libc::SIGHUP),
        );

        assert_eq!(outcome.exit_code, exit_codes::SIGNAL_EXIT_BASE + libc::SIGHUP);
        assert!(!marker.exists());
        assert_eq!(
            recorder.terminal(),
            vec![TaskSignal::Abort {
                reason: Some("received SIGHUP".to_string())
            }]
        );
    }
}
