//! Configuration types

use crate::controller::{
    ControllerSettings, ForwardingMode, PortId, SwitchId, TrunkPolicy, VlanBinding,
};
use crate::protocol::VlanId;
use crate::telemetry::LogConfig;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// User-defined configuration (controller.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
    #[serde(default)]
    pub switches: Vec<SwitchConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModeConfig {
    #[default]
    Vlan,
    Learning,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ControllerConfig {
    #[serde(default)]
    pub mode: ModeConfig,
    /// Seconds; 0 disables expiration
    pub expiration_time: Option<f64>,
    /// Seconds between expiration sweeps
    pub sweep_interval: Option<f64>,
    pub native_vlan: Option<u16>,
    /// Rule limit per switch for the in-memory plane
    pub flow_table_capacity: Option<usize>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub level: Option<String>,
    pub format: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwitchConfig {
    pub id: u64,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PortConfig {
    pub port: PortId,
    pub vlan: Option<u16>,
    #[serde(default)]
    pub trunk: bool,
}

pub const DEFAULT_EXPIRATION_TIME: f64 = 300.0;
pub const DEFAULT_SWEEP_INTERVAL: f64 = 1.0;

impl ControllerConfig {
    pub fn expiration_time(&self) -> f64 {
        self.expiration_time.unwrap_or(DEFAULT_EXPIRATION_TIME)
    }

    pub fn sweep_interval(&self) -> f64 {
        self.sweep_interval.unwrap_or(DEFAULT_SWEEP_INTERVAL)
    }

    /// Typed controller settings. Fails on values `validate` reports as errors.
    pub fn to_settings(&self) -> Result<ControllerSettings> {
        let expiration_time = seconds("controller.expiration_time", self.expiration_time())?;
        let native_vlan = match self.native_vlan {
            Some(id) => Some(VlanId::new(id).ok_or(Error::InvalidVlan(id))?),
            None => None,
        };
        let mode = match self.mode {
            ModeConfig::Vlan => ForwardingMode::VlanEnforcing,
            ModeConfig::Learning => ForwardingMode::Learning,
        };

        Ok(ControllerSettings {
            mode,
            expiration_time,
            trunk: TrunkPolicy { native_vlan },
        })
    }

    pub fn sweep_duration(&self) -> Result<Duration> {
        seconds("controller.sweep_interval", self.sweep_interval())
    }
}

fn seconds(key: &str, value: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(value)
        .map_err(|_| Error::Config(format!("{}: invalid duration {}", key, value)))
}

impl LoggingConfig {
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: self.level.clone().unwrap_or_else(|| "info".to_string()),
            format: self.format.clone().unwrap_or_else(|| "pretty".to_string()),
        }
    }
}

impl SwitchConfig {
    pub fn switch_id(&self) -> SwitchId {
        SwitchId(self.id)
    }
}

impl PortConfig {
    /// Binding this port resolves to; `Ok(None)` leaves it unbound.
    ///
    /// `trunk = true` wins over a missing `vlan`; `vlan = 4095` is also a trunk.
    pub fn binding(&self) -> Result<Option<VlanBinding>> {
        match (self.trunk, self.vlan) {
            (true, None) => Ok(Some(VlanBinding::Trunk)),
            (true, Some(VlanId::TRUNK_SENTINEL)) => Ok(Some(VlanBinding::Trunk)),
            (true, Some(id)) => Err(Error::Config(format!(
                "port {}: trunk port cannot carry access vlan {}",
                self.port, id
            ))),
            (false, Some(id)) => VlanBinding::from_config_id(id).map(Some),
            (false, None) => Ok(None),
        }
    }
}

// ============================================================================
// Lock file types (generated, includes all defaults)
// ============================================================================

/// Generated lock file with all defaults filled in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLock {
    pub generated_at: String,
    pub source_hash: String,
    pub controller: ControllerLock,
    pub logging: LoggingLock,
    pub switches: Vec<SwitchLock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerLock {
    pub mode: ModeConfig,
    pub expiration_time: f64,
    pub sweep_interval: f64,
    /// 0 when untagged frames on trunks are dropped
    pub native_vlan: u16,
    /// 0 when unbounded
    pub flow_table_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingLock {
    pub level: String,
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchLock {
    pub id: String,
    pub ports: Vec<PortLock>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortLock {
    pub port: PortId,
    /// "vlan N", "trunk" or "unbound"
    pub binding: String,
    pub vlan_id: Option<u16>,
}

impl ConfigLock {
    pub fn from_config(config: &Config, source: &str) -> Self {
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(source.as_bytes());

        let logging = config
            .logging
            .as_ref()
            .map(LoggingConfig::to_log_config)
            .unwrap_or_else(LogConfig::new);

        let switches = config
            .switches
            .iter()
            .map(|sw| SwitchLock {
                id: sw.switch_id().to_string(),
                ports: sw
                    .ports
                    .iter()
                    .map(|p| {
                        let binding = p.binding().ok().flatten();
                        PortLock {
                            port: p.port,
                            binding: binding.map_or("unbound".to_string(), |b| b.to_string()),
                            vlan_id: binding.map(|b| b.config_id()),
                        }
                    })
                    .collect(),
            })
            .collect();

        ConfigLock {
            generated_at: chrono::Utc::now().to_rfc3339(),
            source_hash: format!("{:08x}", hasher.finalize()),
            controller: ControllerLock {
                mode: config.controller.mode,
                expiration_time: config.controller.expiration_time(),
                sweep_interval: config.controller.sweep_interval(),
                native_vlan: config.controller.native_vlan.unwrap_or(0),
                flow_table_capacity: config.controller.flow_table_capacity.unwrap_or(0),
            },
            logging: LoggingLock {
                level: logging.level,
                format: logging.format,
            },
            switches,
        }
    }
}
