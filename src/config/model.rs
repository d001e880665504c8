//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Deployment configuration of the forecast suite.
///
/// This struct represents the deploy config YAML file. Unknown fields are
/// ignored by the typed view but stay reachable through [`Config::get`], which
/// looks values up in the raw document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Suite settings
    // =========================================================================
    /// Workspace root on the parallel filesystem (required).
    pub workroot: String,

    /// Static data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub staticdata: Option<String>,

    /// Experiment version of the suite.
    #[serde(default = "default_expver")]
    pub expver: String,

    /// Archive directory for forecast output.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exparch: Option<String>,

    /// Archive directory for initial flows.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iniexparch: Option<String>,

    /// Experiment version of the ERA5 forcing.
    #[serde(default = "default_expver")]
    pub era5_expver: String,

    /// Experiment version of the ensemble forecast forcing.
    #[serde(default = "default_expver")]
    pub forecast_forcings_expver: String,

    /// TEST or PROD.
    pub mode: SuiteMode,

    // =========================================================================
    // Sections
    // =========================================================================
    pub manager: ManagerSettings,

    pub ecflow: EcflowSettings,

    pub conda: CondaSettings,

    /// Job destinations by name (`default`, `serial`, `parallel`, ...).
    pub destinations: BTreeMap<String, Destination>,

    // =========================================================================
    // Provenance
    // =========================================================================
    /// Path the config was loaded from.
    #[serde(skip)]
    pub origin: Option<PathBuf>,

    /// The document as parsed, for dotted-key lookups.
    #[serde(skip)]
    pub raw: serde_yaml::Value,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workroot: String::new(),
            staticdata: None,
            expver: default_expver(),
            exparch: None,
            iniexparch: None,
            era5_expver: default_expver(),
            forecast_forcings_expver: default_expver(),
            mode: SuiteMode::default(),
            manager: ManagerSettings::default(),
            ecflow: EcflowSettings::default(),
            conda: CondaSettings::default(),
            destinations: BTreeMap::new(),
            origin: None,
            raw: serde_yaml::Value::Null,
        }
    }
}
