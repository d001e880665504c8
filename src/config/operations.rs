//! Config loading, validation, and lookup operations.

use super::model::Config;
use super::types::{Destination, DestinationFallback};
use crate::error::{EcfjobError, Result};
use serde_yaml::{Mapping, Value};
use std::path::Path;

impl Config {
    /// Load config from a YAML file.
    ///
    /// The config remembers the absolute path it was loaded from as its origin.
    ///
    /// # Returns
    ///
    /// * `Ok(Config)` - Successfully loaded and validated config
    /// * `Err(EcfjobError::ConfigError)` - Read error, parse error or validation failure
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            EcfjobError::ConfigError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::parse_at(&content, path)
    }

    /// Parse config text that was read from `path`.
    ///
    /// Errors are prefixed with the path and the config's origin is set to
    /// its absolute form, as with [`Config::load`].
    pub fn parse_at(content: &str, path: &Path) -> Result<Self> {
        let mut config = Self::from_yaml(content).map_err(|e| match e {
            EcfjobError::ConfigError(msg) => {
                EcfjobError::ConfigError(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?;
        config.origin = Some(std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()));
        Ok(config)
    }

    /// Parse config from a YAML string.
    ///
    /// An empty document parses to the defaults (and then fails validation
    /// because `workroot` is required).
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let raw: Value = serde_yaml::from_str(yaml)
            .map_err(|e| EcfjobError::ConfigError(format!("failed to parse config YAML: {}", e)))?;

        let raw = match raw {
            Value::Null => Value::Mapping(Mapping::new()),
            Value::Mapping(_) => raw,
            _ => {
                return Err(EcfjobError::ConfigError(
                    "config YAML must be a mapping at the top level".to_string(),
                ));
            }
        };

        let mut config: Config = serde_yaml::from_value(raw.clone())
            .map_err(|e| EcfjobError::ConfigError(format!("failed to parse config YAML: {}", e)))?;
        config.raw = raw;

        config.validate()?;
        Ok(config)
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `workroot` must be set
    /// - experiment versions are four alphanumeric characters
    /// - destination `ncpus` and `mem` must be positive when given
    pub fn validate(&self) -> Result<()> {
        if self.workroot.trim().is_empty() {
            return Err(EcfjobError::ConfigError(
                "config validation failed: workroot must be set".to_string(),
            ));
        }

        for (field, value) in [
            ("expver", &self.expver),
            ("era5_expver", &self.era5_expver),
            ("forecast_forcings_expver", &self.forecast_forcings_expver),
        ] {
            if value.len() != 4 || !value.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(EcfjobError::ConfigError(format!(
                    "config validation failed: {} must be four alphanumeric characters (found '{}')",
                    field, value
                )));
            }
        }

        for (name, dest) in &self.destinations {
            if dest.ncpus == Some(0) {
                return Err(EcfjobError::ConfigError(format!(
                    "config validation failed: destinations.{}.ncpus must be greater than 0",
                    name
                )));
            }
            if dest.mem == Some(0) {
                return Err(EcfjobError::ConfigError(format!(
                    "config validation failed: destinations.{}.mem must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Look up a value by dotted key (`manager.executable`, `workroot`, ...).
    ///
    /// # Returns
    ///
    /// * `Ok(Some(text))` - The key holds a scalar
    /// * `Ok(None)` - The key is absent or null
    /// * `Err(EcfjobError::ConfigError)` - The key names a section or a list
    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let mut node = &self.raw;
        for part in key.split('.') {
            match node.as_mapping().and_then(|m| m.get(part)) {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        scalar_text(node).map_err(|kind| {
            EcfjobError::ConfigError(format!("'{}' is a {}, not a value", key, kind))
        })
    }

    /// Look up a required value by dotted key.
    pub fn require(&self, key: &str) -> Result<String> {
        self.get(key)?.ok_or_else(|| {
            EcfjobError::ConfigError(format!("'{}' is not defined in the config", key))
        })
    }

    /// ecFlow variables for a job destination.
    ///
    /// When `name` is not configured the fallback decides: `Parent` yields no
    /// variables, `Named` uses another destination.
    /// Without a fallback a missing destination is an error.
    pub fn destination(
        &self,
        name: &str,
        fallback: Option<&DestinationFallback>,
    ) -> Result<Vec<(String, String)>> {
        if let Some(dest) = self.destinations.get(name) {
            return Ok(destination_vars(dest));
        }

        match fallback {
            None => Err(EcfjobError::ConfigError(format!(
                "destination '{}' is not defined in destinations",
                name
            ))),
            Some(DestinationFallback::Parent) => Ok(Vec::new()),
            Some(DestinationFallback::Named(other)) => match self.destinations.get(other) {
                Some(dest) => Ok(destination_vars(dest)),
                None => Err(EcfjobError::ConfigError(format!(
                    "destination '{}' is not defined and fallback '{}' is not defined either",
                    name, other
                ))),
            },
        }
    }

    /// Directory suite libraries and scripts are installed in.
    pub fn suite_libdir(&self) -> String {
        format!("{}/lib", self.workroot.trim_end_matches('/'))
    }

    /// Directory forecasts run in.
    pub fn suite_workdir(&self) -> String {
        format!("{}/workdir", self.workroot.trim_end_matches('/'))
    }
}

/// Translate a destination into ecFlow variables, in definition order.
pub fn destination_vars(dest: &Destination) -> Vec<(String, String)> {
    let mut vars = Vec::new();
    let mut push = |key: &str, value: &Option<String>| {
        if let Some(v) = value {
            vars.push((key.to_string(), v.clone()));
        }
    };

    push("REMOTE_HOST", &dest.host);
    push("BKUP_HOST", &dest.bkup_host);
    push("STHOST", &dest.sthost);
    push("BKUP_STHOST", &dest.bkup_sthost);
    push("USER", &dest.user);
    push("QUEUE", &dest.queue);
    push("ACCOUNT", &dest.account);
    push("ECF_OUT", &dest.outdir);

    if let Some(logserver) = &dest.logserver {
        vars.push(("ECF_LOGHOST".to_string(), logserver.clone()));
        vars.push(("ECF_LOGPORT".to_string(), dest.logport.to_string()));
    }
    if let Some(ncpus) = dest.ncpus {
        vars.push(("NCPUS".to_string(), ncpus.to_string()));
    }
    if let Some(mem) = dest.mem {
        vars.push(("MEM".to_string(), mem.to_string()));
    }
    vars
}

/// Render a scalar YAML node as text. Errors carry the kind of non-scalar node.
fn scalar_text(node: &Value) -> std::result::Result<Option<String>, &'static str> {
    match node {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(b.to_string())),
        Value::Number(n) => Ok(Some(n.to_string())),
        Value::String(s) => Ok(Some(s.clone())),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        Value::Sequence(_) => Err("list"),
        Value::Mapping(_) => Err("section"),
    }
}
