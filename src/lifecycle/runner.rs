//! Running a task command under a [`TaskGuard`].

use super::guard::{TaskGuard, TaskOutcome};
use super::signals;
use crate::environment::{TASK_UMASK, TaskEnvironment};
use crate::error::{EcfjobError, Result};
use crate::exit_codes;
use crate::notify::Orchestrator;
use std::process::{Child, Command, ExitStatus};
use std::time::Duration;

/// Options for [`run_task`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// How often the wait loop checks the child and pending signals.
    pub poll_interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Run `command` as the body of the task `guard` was started for.
///
/// The guard is finished with the command's exit status, or aborted with 127
/// if the command cannot be spawned and with `128 + signo` if the wrapper was
/// signalled at any point since the guard started. A signal that arrives
/// before the spawn means the command never runs.
pub fn run_task<O: Orchestrator>(
    mut guard: TaskGuard<O>,
    env: &TaskEnvironment,
    command: &[String],
    options: &RunOptions,
) -> TaskOutcome {
    let Some((program, args)) = command.split_first() else {
        return guard.abort(exit_codes::USER_ERROR, "no task command given");
    };

    if let Some(signo) = guard.received_signal() {
        return guard.interrupted(signo);
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .envs(env.vars().iter().map(|(k, v)| (k.as_str(), v.as_str())));
    set_umask(&mut cmd);

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            return guard.abort(
                exit_codes::TASK_SPAWN_FAILURE,
                format!("failed to start {}: {}", program, e),
            );
        }
    };

    match wait_forwarding(&mut child, &mut guard, options.poll_interval) {
        Ok(code) => match guard.received_signal() {
            Some(signo) => guard.interrupted(signo),
            None => guard.finish(code),
        },
        Err(e) => guard.abort(exit_codes::USER_ERROR, e.to_string()),
    }
}

#[cfg(unix)]
fn set_umask(cmd: &mut Command) {
    use std::os::unix::process::CommandExt;

    // SAFETY: umask is async-signal-safe and touches no memory.
    unsafe {
        cmd.pre_exec(|| {
            libc::umask(TASK_UMASK as libc::mode_t);
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn set_umask(_cmd: &mut Command) {}

/// Wait for the child, passing on any signal the wrapper receives.
fn wait_forwarding<O: Orchestrator>(
    child: &mut Child,
    guard: &mut TaskGuard<O>,
    poll_interval: Duration,
) -> Result<i32> {
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return Ok(exit_code_of(status)),
            Ok(None) => {
                if let Some(signo) = guard.take_new_signal() {
                    if let Err(e) = signals::forward(child.id(), signo) {
                        eprintln!(
                            "Warning: failed to forward {} to task: {}",
                            signals::signal_name(signo),
                            e
                        );
                    }
                }
                std::thread::sleep(poll_interval);
            }
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EcfjobError::UserError(format!(
                    "failed to check task status: {}",
                    e
                )));
            }
        }
    }
}

/// Shell-style exit status: the exit code, or `128 + signo` if killed.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signo) = status.signal() {
            return exit_codes::SIGNAL_EXIT_BASE + signo;
        }
    }
    exit_codes::USER_ERROR
}
