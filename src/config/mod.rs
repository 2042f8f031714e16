//! Configuration management
//!
//! Handles controller.toml (user-defined), controller.lock (generated with all
//! defaults) and recorded packet-in traces used for replay.

mod trace;
mod types;
mod validation;

pub use trace::{load_trace, parse_trace, Trace, TraceEvent};
pub use types::*;
pub use validation::{validate, ValidationResult};

use crate::{Error, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

pub fn parse(content: &str) -> Result<Config> {
    toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
}

/// Generate a lock file from config, filling in all defaults
pub fn generate_lock(config: &Config, source: &str) -> ConfigLock {
    ConfigLock::from_config(config, source)
}
