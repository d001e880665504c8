//! Error types for the ecfjob CLI.
//!
//! Uses thiserror for derive macros and provides user-actionable error messages.

use crate::exit_codes;
use thiserror::Error;

/// Main error type for ecfjob operations.
///
/// Each variant maps to a specific exit code. At the task level every one of
/// them is fatal: the lifecycle wrapper reports `abort` and stops.
#[derive(Error, Debug)]
pub enum EcfjobError {
    /// User provided invalid arguments or the task context is incomplete.
    #[error("{0}")]
    UserError(String),

    /// A script or deploy template could not be rendered.
    #[error("Template error: {0}")]
    TemplateError(String),

    /// The deploy config could not be read, parsed or validated.
    #[error("Config error: {0}")]
    ConfigError(String),

    /// The deploy config could not be copied from its source host.
    #[error("Remote copy failed: {0}")]
    RemoteCopyError(String),

    /// The orchestrator could not be notified.
    #[error("Notification failed: {0}")]
    NotifyError(String),
}

impl EcfjobError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            EcfjobError::UserError(_) => exit_codes::USER_ERROR,
            EcfjobError::TemplateError(_) => exit_codes::TEMPLATE_FAILURE,
            EcfjobError::ConfigError(_) => exit_codes::CONFIG_FAILURE,
            EcfjobError::RemoteCopyError(_) => exit_codes::REMOTE_COPY_FAILURE,
            EcfjobError::NotifyError(_) => exit_codes::NOTIFY_FAILURE,
        }
    }
}

/// Result type alias for ecfjob operations.
pub type Result<T> = std::result::Result<T, EcfjobError>;
