//! Task lifecycle wrapper.
//!
//! [`TaskGuard`] brackets a task: `init` when it starts, then exactly one
//! terminal notification (`complete` on exit 0, `abort` otherwise) together
//! with temp directory cleanup and the duration report. The terminal path
//! also runs from `Drop`, so early returns and panics still report `abort`.
//!
//! [`run_task`] runs a command as the body of a started guard, forwarding
//! HUP/QUIT/INT/TERM to the child and propagating its exit status.

mod guard;
mod runner;
pub mod signals;


pub use guard::{GuardOptions, TaskGuard, TaskOutcome};
pub use runner::{RunOptions, run_task};
