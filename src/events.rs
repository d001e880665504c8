//! Event logging subsystem for ecfjob.
//!
//! This module implements append-only event logging so a task's lifecycle
//! can be reconstructed after the fact, independently of what the ecFlow
//! server recorded. Events are stored in NDJSON format (one JSON object per
//! line) in `<workdir>/.ecfjob/events.ndjson`, or under `ECFJOB_EVENTS_DIR`
//! when that variable is set.
//!
//! # Event Format
//!
//! Each event is a JSON object with the following fields:
//! - `ts`: RFC3339 timestamp
//! - `action`: The action performed (init, complete, abort, config_resolved, ...)
//! - `actor`: The owner string (e.g., `user@HOST`)
//! - `task`: Optional ecFlow task path (`ECF_NAME`)
//! - `details`: Freeform object with action-specific details
//!
//! # Usage
//!
//! ```ignore
//! use ecfjob::context::TaskContext;
//! use ecfjob::events::{Event, EventAction, EventLog};
//! use serde_json::json;
//!
//! let ctx = TaskContext::from_env()?;
//! let log = EventLog::for_context(&ctx);
//! let event = Event::new(EventAction::Init)
//!     .with_task(&ctx.ecf().name)
//!     .with_details(json!({"pid": std::process::id()}));
//! log.append(&event)?;
//! # Ok::<(), ecfjob::error::EcfjobError>(())
//! ```

use crate::context::{TaskContext, machine_hostname};
use crate::error::{EcfjobError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Variable overriding the events directory.
pub const EVENTS_DIR_VAR: &str = "ECFJOB_EVENTS_DIR";

/// Events directory relative to the job's working directory.
pub const DEFAULT_EVENTS_DIR: &str = ".ecfjob";

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Task started and the server was told
    Init,
    /// Task finished successfully
    Complete,
    /// Task failed or was interrupted
    Abort,
    /// Deploy config located or copied
    ConfigResolved,
    /// In-task notification (event, meter, label)
    Notify,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventAction::Init => write!(f, "init"),
            EventAction::Complete => write!(f, "complete"),
            EventAction::Abort => write!(f, "abort"),
            EventAction::ConfigResolved => write!(f, "config_resolved"),
            EventAction::Notify => write!(f, "notify"),
        }
    }
}

/// An event record for the task log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that was performed.
    pub action: EventAction,

    /// The actor who performed the action (e.g., `user@HOST`).
    pub actor: String,

    /// ecFlow task path, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl Event {
    /// Create a new event with the given action.
    ///
    /// The timestamp is set to the current time, and the actor is
    /// determined from the environment (USER@HOSTNAME).
    pub fn new(action: EventAction) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: get_actor_string(),
            task: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_task(mut self, task: impl Into<String>) -> Self {
        self.task = Some(task.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| {
            EcfjobError::UserError(format!("failed to serialize event to JSON: {}", e))
        })
    }
}

fn get_actor_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, machine_hostname())
}

/// Append-only NDJSON log in one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    dir: PathBuf,
}

impl EventLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The log of the task described by `ctx`.
    pub fn for_context(ctx: &TaskContext) -> Self {
        match ctx.get(EVENTS_DIR_VAR) {
            Some(dir) => Self::new(dir),
            None => Self::new(ctx.workdir().join(DEFAULT_EVENTS_DIR)),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn file_path(&self) -> PathBuf {
        self.dir.join("events.ndjson")
    }

    /// Append an event as one JSON line, creating the file if needed.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Event was appended and synced
    /// * `Err(EcfjobError::UserError)` - Serialization or write failed
    pub fn append(&self, event: &Event) -> Result<()> {
        let events_file = self.file_path();
        let json_line = event.to_ndjson_line()?;

        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|e| {
                EcfjobError::UserError(format!(
                    "failed to create events directory '{}': {}",
                    self.dir.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&events_file)
            .map_err(|e| {
                EcfjobError::UserError(format!(
                    "failed to open events file '{}': {}",
                    events_file.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", json_line).map_err(|e| {
            EcfjobError::UserError(format!(
                "failed to write event to '{}': {}",
                events_file.display(),
                e
            ))
        })?;

        file.sync_all().map_err(|e| {
            EcfjobError::UserError(format!(
                "failed to sync events file '{}': {}",
                events_file.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// Append an event, downgrading failures to a warning.
    ///
    /// The event log is a record, not part of the task protocol; a task must
    /// not fail because its log directory is unwritable.
    pub fn record(&self, event: &Event) {
        if let Err(e) = self.append(event) {
            eprintln!("Warning: {}", e);
        }
    }

    /// Read all events back, oldest first.
    pub fn read_all(&self) -> Result<Vec<Event>> {
        let events_file = self.file_path();
        if !events_file.exists() {
            return Ok(Vec::new());
        }

        let content = fs::read_to_string(&events_file).map_err(|e| {
            EcfjobError::UserError(format!(
                "failed to read events file '{}': {}",
                events_file.display(),
                e
            ))
        })?;

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    EcfjobError::UserError(format!(
                        "malformed event in '{}': {}",
                        events_file.display(),
                        e
                    ))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::task_vars;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_event_creation() {
        let event = Event::new(EventAction::Init);

        assert_eq!(event.action, EventAction::Init);
        assert!(!event.actor.is_empty());
        assert!(event.task.is_none());
        let age = Utc::now().signed_duration_since(event.ts);
        assert!(age.num_minutes() < 1);
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::new(EventAction::Abort)
            .with_task("/geoglows/forecast/run_rapid")
            .with_details(json!({"exit_code": 143, "reason": "signal SIGTERM"}));

        let json_line = event.to_ndjson_line().unwrap();
        assert!(!json_line.contains('\n'));

        let parsed: Event = serde_json::from_str(&json_line).unwrap();
        assert_eq!(parsed.action, EventAction::Abort);
        assert_eq!(parsed.task.as_deref(), Some("/geoglows/forecast/run_rapid"));
        assert_eq!(parsed.details["exit_code"], 143);
    }

    #[test]
    fn test_event_action_serialization() {
        let json_line = Event::new(EventAction::ConfigResolved)
            .to_ndjson_line()
            .unwrap();
        assert!(json_line.contains("\"config_resolved\""));
        assert_eq!(EventAction::ConfigResolved.to_string(), "config_resolved");
    }

    #[test]
    fn test_event_without_task_omits_field() {
        let json_line = Event::new(EventAction::Init).to_ndjson_line().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json_line).unwrap();
        assert!(parsed.get("task").is_none());
    }

    #[test]
    fn test_append_creates_dir_and_file() {
        let temp_dir = TempDir::new().unwrap();
        let log = EventLog::new(temp_dir.path().join("nested/.ecfjob"));

        log.append(&Event::new(EventAction::Init)).unwrap();
        log.append(&Event::new(EventAction::Complete)).unwrap();

        let content = fs::read_to_string(log.file_path()).unwrap();
        assert!(content.ends_with('\n'));
        assert_eq!(content.lines().count(), 2);

        let events = log.read_all().unwrap();
        assert_eq!(events[0].action, EventAction::Init);
        assert_eq!(events[1].action, EventAction::Complete);
    }

    #[test]
    fn test_read_all_without_file() {
        let temp_dir = TempDir::new().unwrap();
        assert!(EventLog::new(temp_dir.path()).read_all().unwrap().is_empty());
    }

    #[test]
    fn test_record_swallows_errors() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("file");
        fs::write(&blocker, "x").unwrap();

        let log = EventLog::new(blocker.join("events"));
        log.record(&Event::new(EventAction::Init));
        assert!(log.append(&Event::new(EventAction::Init)).is_err());
    }

    #[test]
    fn test_for_context() {
        let ctx = TaskContext::from_vars(task_vars(&[])).unwrap();
        assert_eq!(
            EventLog::for_context(&ctx).file_path(),
            PathBuf::from("/work/job/.ecfjob/events.ndjson")
        );

        let ctx = TaskContext::from_vars(task_vars(&[("ECFJOB_EVENTS_DIR", "/logs/ev")])).unwrap();
        assert_eq!(EventLog::for_context(&ctx).dir(), Path::new("/logs/ev"));
    }
}
