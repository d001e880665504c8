//! `ecflow_client` runner.

use super::{Orchestrator, TaskSignal};
use crate::config::EcflowSettings;
use crate::context::EcfEndpoint;
use crate::error::{EcfjobError, Result};
use std::process::Command;

/// Client program used when the deploy config does not name one.
pub const DEFAULT_CLIENT: &str = "ecflow_client";

/// [`Orchestrator`] that reports through the `ecflow_client` binary.
///
/// The endpoint is passed to the client through its environment
/// (`ECF_HOST`, `ECF_PORT`, `ECF_NAME`, `ECF_PASS`), the same way a job
/// script exports them.
#[derive(Debug, Clone)]
pub struct EcflowClient {
    program: String,
    base_args: Vec<String>,
    env: Vec<(String, String)>,
}

impl EcflowClient {
    /// Create a client.
    ///
    /// `command` is split with shell quoting rules, so it may carry leading
    /// arguments (e.g. `"ecflow_client --debug"`).
    pub fn new(command: &str, endpoint: &EcfEndpoint) -> Result<Self> {
        let (program, base_args) = split_command(command)?;
        Ok(Self {
            program,
            base_args,
            env: endpoint.client_env(),
        })
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

fn split_command(command: &str) -> Result<(String, Vec<String>)> {
    let mut words = shell_words::split(command).map_err(|e| {
        EcfjobError::UserError(format!(
            "failed to parse ecflow client command '{}': {}",
            command, e
        ))
    })?;

    if words.is_empty() {
        return Err(EcfjobError::UserError(
            "ecflow client command is empty".to_string(),
        ));
    }

    let program = words.remove(0);
    Ok((program, words))
}

impl Orchestrator for EcflowClient {
    /// Switch to the client named in the deploy config, unless another
    /// client was chosen explicitly.
    fn configure(&mut self, settings: &EcflowSettings) -> Result<()> {
        if self.program != DEFAULT_CLIENT || !self.base_args.is_empty() {
            return Ok(());
        }
        let (program, base_args) = split_command(&settings.client)?;
        self.program = program;
        self.base_args = base_args;
        Ok(())
    }

    fn send(&mut self, signal: &TaskSignal) -> Result<()> {
        let output = Command::new(&self.program)
            .args(&self.base_args)
            .args(signal.args())
            .envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output()
            .map_err(|e| {
                EcfjobError::NotifyError(format!(
                    "failed to execute {} for {}: {}",
                    self.program, signal, e
                ))
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Err(EcfjobError::NotifyError(format!(
            "{} {} failed (exit code {}): {}",
            self.program,
            signal.args().join(" "),
            output.status.code().unwrap_or(-1),
            if stderr.is_empty() { stdout } else { stderr }
        )))
    }
}
