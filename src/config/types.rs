//! Configuration types and defaults for the deploy config.
//!
//! This module defines the section structs, enums and default value
//! functions used by the Config struct.

use serde::{Deserialize, Serialize};

/// Whether the suite runs as a test or as the operational forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SuiteMode {
    #[default]
    Test,
    Prod,
}

impl std::fmt::Display for SuiteMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SuiteMode::Test => write!(f, "TEST"),
            SuiteMode::Prod => write!(f, "PROD"),
        }
    }
}

/// Job manager settings (`manager:` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    /// Path to the troika executable.
    pub executable: String,

    /// Path to the troika configuration file.
    pub config: String,

    /// When true the ecFlow server already defines the troika commands and
    /// none are generated.
    pub settings_from_server: bool,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            executable: default_troika_executable(),
            config: default_troika_config(),
            settings_from_server: false,
        }
    }
}

/// ecFlow client settings (`ecflow:` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EcflowSettings {
    /// Command used to reach the ecFlow server (shell-words parsed).
    pub client: String,

    /// ecFlow version the suite is generated for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl Default for EcflowSettings {
    fn default() -> Self {
        Self {
            client: default_ecflow_client(),
            version: None,
        }
    }
}

/// Conda environment settings (`conda:` section).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CondaSettings {
    /// Environment module providing conda.
    pub module: String,

    /// Name of the environment under `<workroot>/lib/virtualenvs/`.
    pub env: String,
}

impl Default for CondaSettings {
    fn default() -> Self {
        Self {
            module: default_conda_module(),
            env: default_conda_env(),
        }
    }
}

/// A job destination (`destinations.<name>:` section).
///
/// Every field is optional; only the ones that are set produce ecFlow
/// variables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Destination {
    pub host: Option<String>,
    pub bkup_host: Option<String>,
    /// Storage host exported to the job as `STHOST`.
    pub sthost: Option<String>,
    pub bkup_sthost: Option<String>,
    pub user: Option<String>,
    /// Batch queue (SLURM qos).
    pub queue: Option<String>,
    pub account: Option<String>,
    /// Directory job output is written to.
    pub outdir: Option<String>,
    /// Log server host; enables `ECF_LOGHOST`/`ECF_LOGPORT`.
    pub logserver: Option<String>,
    #[serde(default = "default_logport")]
    pub logport: u16,
    pub ncpus: Option<u32>,
    /// Memory per cpu in megabytes.
    pub mem: Option<u32>,
}

/// What to use when a requested destination is not configured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestinationFallback {
    /// Define nothing; the node inherits its parent's variables.
    Parent,
    /// Use another destination instead.
    Named(String),
}

impl DestinationFallback {
    /// Parse a fallback given on the command line: `parent` or a destination name.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("parent") {
            Self::Parent
        } else {
            Self::Named(s.to_string())
        }
    }
}

// Default value functions for serde
pub(crate) fn default_expver() -> String {
    "0001".to_string()
}
pub(crate) fn default_troika_executable() -> String {
    "/usr/local/bin/troika".to_string()
}
pub(crate) fn default_troika_config() -> String {
    "/opt/troika/etc/troika.yml".to_string()
}
pub(crate) fn default_ecflow_client() -> String {
    "ecflow_client".to_string()
}
pub(crate) fn default_conda_module() -> String {
    "conda/22.11.1-2".to_string()
}
pub(crate) fn default_conda_env() -> String {
    "rapid".to_string()
}
pub(crate) fn default_logport() -> u16 {
    9316
}
