//! Implementation of the `ecfjob notify` command.
//!
//! Single notifications sent from inside a running task, e.g. to set an
//! event when output is ready or to move a progress meter. Lifecycle
//! signals are available too for job scripts that do not use `ecfjob run`.

use crate::cli::{NotifyAction, NotifyCommand};
use crate::commands::client_command;
use crate::context::TaskContext;
use crate::error::Result;
use crate::events::{Event, EventAction, EventLog};
use crate::notify::{EcflowClient, Orchestrator, TaskSignal};
use serde_json::json;

/// Execute the `ecfjob notify` command.
pub fn cmd_notify(cmd: NotifyCommand) -> Result<()> {
    let ctx = TaskContext::from_env()?;
    let mut client = EcflowClient::new(
        &client_command(cmd.client.as_deref(), ctx.vars()),
        ctx.ecf(),
    )?;

    let signal = signal_for(cmd.action, parent_pid());
    send(&mut client, &ctx, &signal)
}

fn signal_for(action: NotifyAction, default_pid: u32) -> TaskSignal {
    match action {
        NotifyAction::Init { pid } => TaskSignal::Init {
            pid: pid.unwrap_or(default_pid),
        },
        NotifyAction::Complete => TaskSignal::Complete,
        NotifyAction::Abort { reason } => TaskSignal::Abort { reason },
        NotifyAction::Event { name } => TaskSignal::Event { name },
        NotifyAction::Meter { name, value } => TaskSignal::Meter { name, value },
        NotifyAction::Label { name, text } => TaskSignal::Label {
            name,
            text: text.join(" "),
        },
    }
}

/// Deliver `signal` and record it in the task's event log.
fn send<O: Orchestrator>(orchestrator: &mut O, ctx: &TaskContext, signal: &TaskSignal) -> Result<()> {
    orchestrator.send(signal)?;

    let action = match signal {
        TaskSignal::Init { .. } => EventAction::Init,
        TaskSignal::Complete => EventAction::Complete,
        TaskSignal::Abort { .. } => EventAction::Abort,
        _ => EventAction::Notify,
    };
    EventLog::for_context(ctx).record(
        &Event::new(action)
            .with_task(&ctx.ecf().name)
            .with_details(json!({ "signal": signal.to_string(), "args": signal.args() })),
    );
    Ok(())
}

/// The job shell that invoked us is the process the task runs as.
#[cfg(unix)]
fn parent_pid() -> u32 {
    std::os::unix::process::parent_id()
}

#[cfg(not(unix))]
fn parent_pid() -> u32 {
    std::process::id()
}
