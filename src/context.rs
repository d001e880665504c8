//! Task invocation context for ecfjob.
//!
//! An ecFlow job receives its configuration as a flat set of string
//! variables: ecFlow substitutes `%VAR%` references when it generates the
//! job, and the batch system adds its own environment (`TMPDIR`,
//! `SCRATCHDIR`, cpu counts). This module collects that mapping once, at task
//! start, into an immutable [`TaskContext`] that every handler borrows.
//!
//! Nothing in here mutates the process environment. Anything the task needs
//! to see is computed from the context and passed to the child explicitly
//! (see [`crate::environment`]).

use crate::error::{EcfjobError, Result};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

/// Flat mapping of variable names to values.
pub type VarMap = BTreeMap<String, String>;

/// Cpu-count variables, in the order they are consulted.
///
/// `SJOB_NCPUS` is exported by sjob destinations, `TRIMURTI_NCPUS` and
/// `TROIKA_CPUS` by the respective job managers from `%NCPUS%`.
pub const NCPUS_VARS: [&str; 4] = ["SJOB_NCPUS", "TRIMURTI_NCPUS", "TROIKA_CPUS", "NCPUS"];

/// Connection details `ecflow_client` needs to reach the ecFlow server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcfEndpoint {
    /// Server host (`ECF_HOST`).
    pub host: String,
    /// Server port (`ECF_PORT`).
    pub port: u16,
    /// Absolute task path in the suite (`ECF_NAME`).
    pub name: String,
    /// Job password (`ECF_PASS`).
    pub pass: Option<String>,
    /// ecFlow version the job was generated for (`ECF_VERSION`).
    pub version: Option<String>,
}

impl EcfEndpoint {
    /// Read the endpoint from a variable map.
    ///
    /// `ECF_HOST`, `ECF_PORT` and `ECF_NAME` are required; `ECF_PORT` must be
    /// a valid TCP port.
    pub fn from_vars(vars: &VarMap) -> Result<Self> {
        let host = require(vars, "ECF_HOST")?;
        let name = require(vars, "ECF_NAME")?;
        let port_str = require(vars, "ECF_PORT")?;
        let port = port_str.trim().parse::<u16>().map_err(|_| {
            EcfjobError::UserError(format!(
                "ECF_PORT must be a port number, got '{}'",
                port_str
            ))
        })?;

        Ok(Self {
            host: host.to_string(),
            port,
            name: name.to_string(),
            pass: non_empty(vars, "ECF_PASS").map(str::to_string),
            version: non_empty(vars, "ECF_VERSION").map(str::to_string),
        })
    }

    /// Environment variables identifying this task to `ecflow_client`.
    pub fn client_env(&self) -> Vec<(String, String)> {
        let mut env = vec![
            ("ECF_HOST".to_string(), self.host.clone()),
            ("ECF_PORT".to_string(), self.port.to_string()),
            ("ECF_NAME".to_string(), self.name.clone()),
        ];
        if let Some(pass) = &self.pass {
            env.push(("ECF_PASS".to_string(), pass.clone()));
        }
        env
    }
}

/// Immutable invocation context of a single task.
#[derive(Debug, Clone)]
pub struct TaskContext {
    vars: VarMap,
    ecf: EcfEndpoint,
    host: String,
    ncpus: u32,
    tmpdir: Option<PathBuf>,
    scratchdir: Option<PathBuf>,
    workdir: PathBuf,
}

impl TaskContext {
    /// Build the context from the current process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(env_vars())
    }

    /// Build the context from an explicit variable map.
    ///
    /// # Returns
    ///
    /// * `Ok(TaskContext)` - All required ecFlow variables were present
    /// * `Err(EcfjobError::UserError)` - A required variable is missing or malformed
    pub fn from_vars(vars: VarMap) -> Result<Self> {
        let ecf = EcfEndpoint::from_vars(&vars)?;

        let host = match non_empty(&vars, "HOST") {
            Some(h) => h.to_string(),
            None => machine_hostname(),
        };

        let workdir = match non_empty(&vars, "PWD") {
            Some(p) => PathBuf::from(p),
            None => env::current_dir().map_err(|e| {
                EcfjobError::UserError(format!("failed to get current working directory: {}", e))
            })?,
        };

        Ok(Self {
            ncpus: resolve_ncpus(&vars),
            tmpdir: non_empty(&vars, "TMPDIR").map(PathBuf::from),
            scratchdir: non_empty(&vars, "SCRATCHDIR").map(PathBuf::from),
            ecf,
            host,
            workdir,
            vars,
        })
    }

    /// The raw variable map the context was built from.
    pub fn vars(&self) -> &VarMap {
        &self.vars
    }

    /// Look up a non-empty variable.
    pub fn get(&self, key: &str) -> Option<&str> {
        non_empty(&self.vars, key)
    }

    pub fn ecf(&self) -> &EcfEndpoint {
        &self.ecf
    }

    /// Host the task runs on.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Number of cpu cores available to the task.
    pub fn ncpus(&self) -> u32 {
        self.ncpus
    }

    pub fn tmpdir(&self) -> Option<&Path> {
        self.tmpdir.as_deref()
    }

    pub fn scratchdir(&self) -> Option<&Path> {
        self.scratchdir.as_deref()
    }

    /// Temporary directory the task should use.
    ///
    /// The batch scratch space takes precedence over `TMPDIR` when the job
    /// was given one.
    pub fn effective_tmpdir(&self) -> Option<&Path> {
        self.scratchdir().or(self.tmpdir())
    }

    /// Working directory of the job.
    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Directories removed when the task finishes.
    pub fn cleanup_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = Vec::new();
        for dir in [&self.tmpdir, &self.scratchdir].into_iter().flatten() {
            if !dirs.contains(dir) {
                dirs.push(dir.clone());
            }
        }
        dirs
    }
}

/// Snapshot the process environment as a variable map.
pub fn env_vars() -> VarMap {
    env::vars().collect()
}

/// Resolve the task's cpu count from the first usable variable in [`NCPUS_VARS`].
pub fn resolve_ncpus(vars: &VarMap) -> u32 {
    NCPUS_VARS
        .iter()
        .filter_map(|key| non_empty(vars, key))
        .filter_map(|v| v.trim().parse::<u32>().ok())
        .find(|&n| n > 0)
        .unwrap_or(1)
}

/// Hostname of this machine, or `unknown` if it cannot be determined.
pub fn machine_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

fn non_empty<'a>(vars: &'a VarMap, key: &str) -> Option<&'a str> {
    vars.get(key).map(String::as_str).filter(|v| !v.is_empty())
}

fn require<'a>(vars: &'a VarMap, key: &str) -> Result<&'a str> {
    non_empty(vars, key).ok_or_else(|| {
        EcfjobError::UserError(format!(
            "{} is not set.\n\
             This command must run inside an ecFlow job (the variable is substituted from %{}%).",
            key, key
        ))
    })
}
