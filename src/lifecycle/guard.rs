//! RAII task guard implementation.

use super::signals::{self, SignalForwarder};
use crate::cleanup;
use crate::context::TaskContext;
use crate::events::{Event, EventAction, EventLog};
use crate::exit_codes;
use crate::notify::{Orchestrator, TaskSignal};
use serde_json::json;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// How a guard finalizes the task.
#[derive(Debug, Clone)]
pub struct GuardOptions {
    /// Remove `TMPDIR`/`SCRATCHDIR` when the task ends.
    pub cleanup: bool,
    /// Where lifecycle events are recorded, if anywhere.
    pub events: Option<EventLog>,
    /// Catch HUP/QUIT/INT/TERM from `start` until the guard ends.
    pub catch_signals: bool,
}

impl Default for GuardOptions {
    fn default() -> Self {
        Self {
            cleanup: true,
            events: None,
            catch_signals: true,
        }
    }
}

/// What happened when a task ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    /// Exit status the wrapper should exit with.
    pub exit_code: i32,
    /// Terminal signal that was sent (or attempted).
    pub signal: TaskSignal,
    /// Whether the orchestrator accepted the terminal signal.
    pub notified: bool,
    pub duration: Duration,
    /// Temporary directories that were removed.
    pub removed_dirs: Vec<PathBuf>,
}

/// RAII guard for a running task.
///
/// Sends `init` on [`TaskGuard::start`] and exactly one terminal signal,
/// either from [`TaskGuard::finish`] / [`TaskGuard::abort`] or, if neither is
/// called, from `Drop`.
///
/// Termination signals are caught for the guard's whole lifetime. They do not
/// stop the wrapper; the code driving the task checks
/// [`TaskGuard::received_signal`] and ends the task with `128 + signo`.
#[derive(Debug)]
pub struct TaskGuard<O: Orchestrator> {
    orchestrator: O,
    task: String,
    cleanup_dirs: Vec<PathBuf>,
    events: Option<EventLog>,
    signals: Option<SignalForwarder>,
    received: Option<i32>,
    started: Instant,
    finished: bool,
}

impl<O: Orchestrator> TaskGuard<O> {
    /// Tell the orchestrator the task has started.
    ///
    /// An undelivered `init` is only a warning: the task still runs and its
    /// exit status still decides the terminal signal.
    pub fn start(orchestrator: O, ctx: &TaskContext, options: GuardOptions) -> Self {
        let mut guard = Self {
            orchestrator,
            task: ctx.ecf().name.clone(),
            cleanup_dirs: if options.cleanup {
                ctx.cleanup_dirs()
            } else {
                Vec::new()
            },
            events: options.events,
            signals: None,
            received: None,
            started: Instant::now(),
            finished: false,
        };

        let pid = std::process::id();
        let notified = match guard.orchestrator.send(&TaskSignal::Init { pid }) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("Warning: {}", e);
                false
            }
        };

        if options.catch_signals {
            match SignalForwarder::install() {
                Ok(forwarder) => guard.signals = Some(forwarder),
                Err(e) => eprintln!("Warning: {}; signals will not be reported", e),
            }
        }

        println!("{}", ctx.host());
        guard.record(
            EventAction::Init,
            json!({"pid": pid, "host": ctx.host(), "ncpus": ctx.ncpus(), "notified": notified}),
        );
        guard
    }

    /// The orchestrator later signals go to.
    pub fn orchestrator_mut(&mut self) -> &mut O {
        &mut self.orchestrator
    }

    /// The last termination signal received since the guard started.
    pub fn received_signal(&mut self) -> Option<i32> {
        self.take_new_signal();
        self.received
    }

    /// A signal received since the previous call, if any.
    pub(super) fn take_new_signal(&mut self) -> Option<i32> {
        let signo = self.signals.as_ref().and_then(SignalForwarder::take_pending)?;
        self.received = Some(signo);
        Some(signo)
    }

    /// End the task as interrupted by `signo`.
    pub fn interrupted(self, signo: i32) -> TaskOutcome {
        self.abort(
            exit_codes::SIGNAL_EXIT_BASE + signo,
            format!("received {}", signals::signal_name(signo)),
        )
    }

    /// End the task with its exit status: `complete` on 0, `abort` otherwise.
    pub fn finish(mut self, exit_code: i32) -> TaskOutcome {
        let signal = if exit_code == exit_codes::SUCCESS {
            TaskSignal::Complete
        } else {
            TaskSignal::Abort { reason: None }
        };
        self.finalize(exit_code, signal)
    }

    /// End the task with an `abort` carrying `reason`.
    ///
    /// An `exit_code` of 0 is reported as 1; an aborted task never exits 0.
    pub fn abort(mut self, exit_code: i32, reason: impl Into<String>) -> TaskOutcome {
        let exit_code = if exit_code == exit_codes::SUCCESS {
            exit_codes::USER_ERROR
        } else {
            exit_code
        };
        self.finalize(
            exit_code,
            TaskSignal::Abort {
                reason: Some(reason.into()),
            },
        )
    }

    fn finalize(&mut self, exit_code: i32, signal: TaskSignal) -> TaskOutcome {
        self.finished = true;

        let removed_dirs = cleanup::remove_dirs(&self.cleanup_dirs);
        let duration = self.started.elapsed();
        println!("TASK DURATION {}", duration.as_secs());

        let notified = match self.orchestrator.send(&signal) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("Warning: {}", e);
                false
            }
        };

        let (action, reason) = match &signal {
            TaskSignal::Abort { reason } => (EventAction::Abort, reason.clone()),
            _ => (EventAction::Complete, None),
        };
        self.record(
            action,
            json!({
                "exit_code": exit_code,
                "duration_secs": duration.as_secs(),
                "notified": notified,
                "reason": reason,
                "removed_dirs": removed_dirs,
            }),
        );

        TaskOutcome {
            exit_code,
            signal,
            notified,
            duration,
            removed_dirs,
        }
    }

    fn record(&self, action: EventAction, details: serde_json::Value) {
        if let Some(log) = &self.events {
            log.record(
                &Event::new(action)
                    .with_task(&self.task)
                    .with_details(details),
            );
        }
    }
}

impl<O: Orchestrator> Drop for TaskGuard<O> {
    fn drop(&mut self) {
        if !self.finished {
            eprintln!("Warning: task '{}' ended without an exit status", self.task);
            self.finalize(
                exit_codes::USER_ERROR,
                TaskSignal::Abort {
                    reason: Some("wrapper exited early".to_string()),
                },
            );
        }
    }
}
