//! Deploy configuration for ecfjob.
//!
//! This module defines the Config struct that represents the suite's deploy
//! config YAML. It supports forward-compatible parsing (unknown fields are
//! ignored by the typed view and remain available to `get`), sensible
//! defaults for optional fields, and validation of config values.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use operations::destination_vars;
pub use types::{
    CondaSettings, Destination, DestinationFallback, EcflowSettings, ManagerSettings, SuiteMode,
};
