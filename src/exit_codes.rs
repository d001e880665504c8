//! Exit code constants for the ecfjob CLI.
//!
//! Codes returned by ecfjob itself (the `run` command returns the wrapped
//! task's own status instead):
//! - 0: Success
//! - 1: User error (bad args, missing variables)
//! - 2: Template rendering failure
//! - 3: Deploy config failure
//! - 4: Remote copy failure
//! - 5: Orchestrator notification failure

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or an incomplete task context.
pub const USER_ERROR: i32 = 1;

/// Template failure: undefined variable, missing include, bad expression.
pub const TEMPLATE_FAILURE: i32 = 2;

/// Deploy config could not be read, parsed or validated.
pub const CONFIG_FAILURE: i32 = 3;

/// Remote copy of the deploy config failed.
pub const REMOTE_COPY_FAILURE: i32 = 4;

/// `ecflow_client` could not be run or returned non-zero.
pub const NOTIFY_FAILURE: i32 = 5;

/// Exit status used when the task command could not be spawned.
pub const TASK_SPAWN_FAILURE: i32 = 127;

/// Offset added to a signal number to form the exit status of a signalled task.
pub const SIGNAL_EXIT_BASE: i32 = 128;
