//! Task notifications to the ecFlow server.
//!
//! A task reports `init` when it starts and exactly one of `complete` or
//! `abort` when it ends. In between it may set events, meters and labels to
//! show progress. [`Orchestrator`] is the seam the lifecycle code talks to;
//! [`EcflowClient`] is the real implementation.

mod ecflow_client;

pub use ecflow_client::{DEFAULT_CLIENT, EcflowClient};

use crate::config::EcflowSettings;
use crate::error::Result;
use std::fmt;

/// A message from the task to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSignal {
    /// The task started running as process `pid`.
    Init { pid: u32 },
    /// The task finished successfully.
    Complete,
    /// The task failed.
    Abort { reason: Option<String> },
    /// Set a task event.
    Event { name: String },
    /// Update a task meter.
    Meter { name: String, value: i64 },
    /// Update a task label.
    Label { name: String, text: String },
}

impl TaskSignal {
    /// Command-line arguments for `ecflow_client`.
    pub fn args(&self) -> Vec<String> {
        match self {
            TaskSignal::Init { pid } => vec![format!("--init={}", pid)],
            TaskSignal::Complete => vec!["--complete".to_string()],
            TaskSignal::Abort { reason: None } => vec!["--abort".to_string()],
            TaskSignal::Abort {
                reason: Some(reason),
            } => vec![format!("--abort={}", reason)],
            TaskSignal::Event { name } => vec![format!("--event={}", name)],
            TaskSignal::Meter { name, value } => {
                vec![format!("--meter={}", name), value.to_string()]
            }
            TaskSignal::Label { name, text } => vec![format!("--label={}", name), text.clone()],
        }
    }

    /// Whether this signal ends the task.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskSignal::Complete | TaskSignal::Abort { .. })
    }
}

impl fmt::Display for TaskSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskSignal::Init { .. } => write!(f, "init"),
            TaskSignal::Complete => write!(f, "complete"),
            TaskSignal::Abort { .. } => write!(f, "abort"),
            TaskSignal::Event { .. } => write!(f, "event"),
            TaskSignal::Meter { .. } => write!(f, "meter"),
            TaskSignal::Label { .. } => write!(f, "label"),
        }
    }
}

/// Receiver of task notifications.
pub trait Orchestrator {
    /// Deliver one signal. Implementations do not retry.
    fn send(&mut self, signal: &TaskSignal) -> Result<()>;

    /// Apply the deploy config's client settings once they are known.
    fn configure(&mut self, _settings: &EcflowSettings) -> Result<()> {
        Ok(())
    }
}

impl<O: Orchestrator + ?Sized> Orchestrator for Box<O> {
    fn send(&mut self, signal: &TaskSignal) -> Result<()> {
        (**self).send(signal)
    }

    fn configure(&mut self, settings: &EcflowSettings) -> Result<()> {
        (**self).configure(settings)
    }
}
