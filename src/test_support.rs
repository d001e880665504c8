use crate::context::VarMap;
use crate::error::{EcfjobError, Result};
use crate::notify::{Orchestrator, TaskSignal};
use crate::resolver::RemoteCopier;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub(crate) fn var_map(pairs: &[(&str, &str)]) -> VarMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Variables of a typical task; `overrides` replace or extend them.
pub(crate) fn task_vars(overrides: &[(&str, &str)]) -> VarMap {
    let mut vars = var_map(&[
        ("ECF_HOST", "ecflow.example.org"),
        ("ECF_PORT", "3141"),
        ("ECF_NAME", "/geoglows/forecast/run_rapid"),
        ("PWD", "/work/job"),
    ]);
    vars.extend(var_map(overrides));
    vars
}

/// Orchestrator that records every signal it is sent.
///
/// Clones share the record, so a test can keep one handle while the code
/// under test owns another.
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingOrchestrator {
    sent: Rc<RefCell<Vec<TaskSignal>>>,
    fail: Failure,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Failure {
    #[default]
    Never,
    Always,
    Init,
    Terminal,
}

impl RecordingOrchestrator {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Records signals but reports every delivery as failed.
    pub(crate) fn failing() -> Self {
        Self {
            fail: Failure::Always,
            ..Self::default()
        }
    }

    /// Rejects `init` but accepts everything after it.
    pub(crate) fn unreachable_at_start() -> Self {
        Self {
            fail: Failure::Init,
            ..Self::default()
        }
    }

    /// Accepts `init` and progress signals but not `complete`/`abort`.
    pub(crate) fn unreachable_at_exit() -> Self {
        Self {
            fail: Failure::Terminal,
            ..Self::default()
        }
    }

    pub(crate) fn sent(&self) -> Vec<TaskSignal> {
        self.sent.borrow().clone()
    }

    pub(crate) fn terminal(&self) -> Vec<TaskSignal> {
        self.sent()
            .into_iter()
            .filter(TaskSignal::is_terminal)
            .collect()
    }
}

impl Orchestrator for RecordingOrchestrator {
    fn send(&mut self, signal: &TaskSignal) -> Result<()> {
        self.sent.borrow_mut().push(signal.clone());
        let fails = match self.fail {
            Failure::Never => false,
            Failure::Always => true,
            Failure::Init => matches!(signal, TaskSignal::Init { .. }),
            Failure::Terminal => signal.is_terminal(),
        };
        if fails {
            return Err(EcfjobError::NotifyError(format!(
                "{} not delivered: server unreachable",
                signal
            )));
        }
        Ok(())
    }
}

/// Remote copier that records calls and optionally writes the copy.
#[derive(Debug, Default)]
pub(crate) struct RecordingCopier {
    pub(crate) calls: Vec<(String, PathBuf, PathBuf)>,
    content: Option<String>,
    fail: bool,
    raise: Option<i32>,
}

impl RecordingCopier {
    /// Copies succeed and produce a file with `content`.
    pub(crate) fn with_content(content: &str) -> Self {
        Self {
            content: Some(content.to_string()),
            ..Self::default()
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Copies succeed, but the wrapper receives `signo` mid-copy.
    #[cfg(unix)]
    pub(crate) fn interrupted(content: &str, signo: i32) -> Self {
        Self {
            raise: Some(signo),
            ..Self::with_content(content)
        }
    }
}

impl RemoteCopier for RecordingCopier {
    fn copy(&mut self, host: &str, remote: &Path, local: &Path) -> Result<()> {
        self.calls
            .push((host.to_string(), remote.to_path_buf(), local.to_path_buf()));

        #[cfg(unix)]
        if let Some(signo) = self.raise {
            crate::lifecycle::signals::forward(std::process::id(), signo).unwrap();
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        if self.fail {
            return Err(EcfjobError::RemoteCopyError(format!(
                "scp {}:{} failed (exit code 255): Host key verification failed.",
                host,
                remote.display()
            )));
        }
        if let Some(content) = &self.content {
            std::fs::write(local, content).unwrap();
        }
        Ok(())
    }
}
