//! Deploy config resolution.
//!
//! Jobs read the suite's deploy config from the host it was deployed from.
//! When that file is visible on the job's host (same machine or a shared
//! filesystem) it is used in place; otherwise it is copied once into the
//! job's working directory. Either way downstream tools find it through
//! `CO_CONFIG_PATH`.

use crate::config::Config;
use crate::context::{VarMap, machine_hostname};
use crate::error::{EcfjobError, Result};
use std::path::{Path, PathBuf};
use std::process::Command;

/// Variable that tells downstream tools where the deploy config is.
pub const CONFIG_PATH_VAR: &str = "CO_CONFIG_PATH";

/// Where the authoritative deploy config lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployConfigRef {
    pub host: String,
    pub path: PathBuf,
}

impl DeployConfigRef {
    pub fn new(host: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            host: host.into(),
            path: path.into(),
        }
    }

    /// Build the reference from explicit values, falling back to the
    /// `DEPLOY_CONFIG_HOST` / `DEPLOY_CONFIG_PATH` task variables.
    ///
    /// Returns `None` when no path is given anywhere. The host defaults
    /// to this machine.
    pub fn from_args_or_vars(
        host: Option<&str>,
        path: Option<&Path>,
        vars: &VarMap,
    ) -> Option<Self> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| non_empty(vars, "DEPLOY_CONFIG_PATH").map(PathBuf::from))?;
        let host = host
            .map(str::to_string)
            .or_else(|| non_empty(vars, "DEPLOY_CONFIG_HOST").map(str::to_string))
            .unwrap_or_else(machine_hostname);
        Some(Self { host, path })
    }
}

/// Copies a file from another host.
pub trait RemoteCopier {
    fn copy(&mut self, host: &str, remote: &Path, local: &Path) -> Result<()>;
}

impl<C: RemoteCopier + ?Sized> RemoteCopier for &mut C {
    fn copy(&mut self, host: &str, remote: &Path, local: &Path) -> Result<()> {
        (**self).copy(host, remote, local)
    }
}

/// [`RemoteCopier`] that shells out to `scp` in batch mode.
#[derive(Debug, Clone)]
pub struct ScpCopier {
    program: String,
}

impl ScpCopier {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for ScpCopier {
    fn default() -> Self {
        Self::new("scp")
    }
}

impl RemoteCopier for ScpCopier {
    fn copy(&mut self, host: &str, remote: &Path, local: &Path) -> Result<()> {
        let source = format!("{}:{}", host, remote.display());

        let output = Command::new(&self.program)
            .args(["-o", "StrictHostKeyChecking=no", "-o", "BatchMode=yes"])
            .arg(&source)
            .arg(local)
            .output()
            .map_err(|e| {
                EcfjobError::RemoteCopyError(format!(
                    "failed to execute {}: {}\n\
                     Fix: ensure {} is installed and in PATH.",
                    self.program, e, self.program
                ))
            })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(EcfjobError::RemoteCopyError(format!(
            "{} {} failed (exit code {}): {}",
            self.program,
            source,
            output.status.code().unwrap_or(-1),
            stderr
        )))
    }
}

/// Outcome of resolving the deploy config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Local path of the config.
    pub path: PathBuf,
    /// Whether the config had to be copied from its source host.
    pub fetched: bool,
}

impl ResolvedConfig {
    /// The `CO_CONFIG_PATH` assignment for the task environment.
    pub fn env(&self) -> (String, String) {
        (CONFIG_PATH_VAR.to_string(), self.path.display().to_string())
    }

    /// Read the resolved config once, returning its text and parsed form.
    pub fn read(&self) -> Result<(String, Config)> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            EcfjobError::ConfigError(format!(
                "failed to read config file '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        let config = Config::parse_at(&content, &self.path)?;
        Ok((content, config))
    }
}

/// Resolves a [`DeployConfigRef`] to a locally readable file.
#[derive(Debug)]
pub struct ConfigResolver<C: RemoteCopier> {
    copier: C,
    dest_dir: PathBuf,
}

impl<C: RemoteCopier> ConfigResolver<C> {
    /// `dest_dir` receives the copy when the config is not reachable.
    pub fn new(copier: C, dest_dir: impl Into<PathBuf>) -> Self {
        Self {
            copier,
            dest_dir: dest_dir.into(),
        }
    }

    /// Make the deploy config available locally.
    ///
    /// # Returns
    ///
    /// * `Ok(ResolvedConfig)` - The config path, and whether it was copied
    /// * `Err(EcfjobError::RemoteCopyError)` - The copy failed; this is fatal
    ///   and not retried
    pub fn resolve(&mut self, reference: &DeployConfigRef) -> Result<ResolvedConfig> {
        if reference.path.is_file() {
            return Ok(ResolvedConfig {
                path: reference.path.clone(),
                fetched: false,
            });
        }

        let file_name = reference.path.file_name().ok_or_else(|| {
            EcfjobError::UserError(format!(
                "deploy config path '{}' does not name a file",
                reference.path.display()
            ))
        })?;
        let local = self.dest_dir.join(file_name);

        self.copier.copy(&reference.host, &reference.path, &local)?;

        if !local.is_file() {
            return Err(EcfjobError::RemoteCopyError(format!(
                "copy of {}:{} finished but '{}' does not exist",
                reference.host,
                reference.path.display(),
                local.display()
            )));
        }

        Ok(ResolvedConfig {
            path: local,
            fetched: true,
        })
    }

    pub fn copier(&self) -> &C {
        &self.copier
    }
}

fn non_empty<'a>(vars: &'a VarMap, key: &str) -> Option<&'a str> {
    vars.get(key).map(String::as_str).filter(|v| !v.is_empty())
}
