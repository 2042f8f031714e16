//! Configuration validation

use super::Config;
use crate::protocol::VlanId;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self {
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn print_diagnostics(&self) {
        for warning in &self.warnings {
            println!("[WARN] {}", warning);
        }
        for error in &self.errors {
            println!("[ERROR] {}", error);
        }
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_controller(config, &mut result);
    validate_logging(config, &mut result);
    validate_switches(config, &mut result);

    result
}

fn validate_controller(config: &Config, result: &mut ValidationResult) {
    let controller = &config.controller;

    let expiration = controller.expiration_time();
    if !expiration.is_finite() || expiration < 0.0 {
        result.error(format!(
            "controller.expiration_time: must be a non-negative number of seconds, got {}",
            expiration
        ));
    } else if expiration == 0.0 {
        result.warn("controller.expiration_time: 0 disables expiration, entries never age out");
    }
    if controller.expiration_time.is_none() {
        result.warn(format!(
            "controller.expiration_time not specified, using default {}",
            expiration
        ));
    }

    let sweep = controller.sweep_interval();
    if !sweep.is_finite() || sweep <= 0.0 {
        result.error(format!(
            "controller.sweep_interval: must be a positive number of seconds, got {}",
            sweep
        ));
    }

    if let Some(native) = controller.native_vlan {
        if VlanId::new(native).is_none() {
            result.error(format!(
                "controller.native_vlan: {} out of range ({}-{})",
                native,
                VlanId::MIN,
                VlanId::MAX
            ));
        }
    }

    if controller.flow_table_capacity == Some(0) {
        result.warn("controller.flow_table_capacity: 0 rejects every flow rule");
    }
}

fn validate_logging(config: &Config, result: &mut ValidationResult) {
    let Some(logging) = &config.logging else {
        return;
    };

    if let Some(format) = &logging.format {
        if !matches!(format.as_str(), "pretty" | "compact" | "json") {
            result.warn(format!(
                "logging.format: unknown format '{}', using pretty",
                format
            ));
        }
    }
    if let Some(level) = &logging.level {
        let known = ["error", "warn", "info", "debug", "trace"];
        if !known.contains(&level.to_lowercase().as_str()) {
            result.warn(format!("logging.level: unknown level '{}', using info", level));
        }
    }
}

fn validate_switches(config: &Config, result: &mut ValidationResult) {
    let mut seen_switches = HashSet::new();

    for switch in &config.switches {
        let name = format!("switches.{}", switch.switch_id());

        if !seen_switches.insert(switch.id) {
            result.error(format!("{}: duplicate switch id", name));
        }

        if switch.ports.is_empty() {
            result.warn(format!("{}: no ports configured", name));
        }

        let mut seen_ports = HashSet::new();
        for port in &switch.ports {
            if !seen_ports.insert(port.port) {
                result.error(format!("{}: port {} listed more than once", name, port.port));
                continue;
            }

            match port.binding() {
                Ok(Some(_)) => {}
                Ok(None) => result.warn(format!(
                    "{}: port {} has no vlan, frames on it are dropped until one is set",
                    name, port.port
                )),
                Err(e) => result.error(format!("{}: {}", name, e)),
            }
        }
    }
}
