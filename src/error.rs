use crate::controller::{PortId, SwitchId};
use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("parse error: {0}")]
    Parse(String),

    #[error("switch {switch} not connected")]
    UnknownSwitch { switch: SwitchId },

    #[error("port {port} not found on switch {switch}")]
    UnknownPort { switch: SwitchId, port: PortId },

    #[error("invalid VLAN id {0} (expected 1-4094, or 4095 for trunk)")]
    InvalidVlan(u16),

    #[error("flow install rejected by switch {switch}: {reason}")]
    FlowInstall { switch: SwitchId, reason: String },

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("controller service stopped")]
    ServiceStopped,
}

pub type Result<T> = std::result::Result<T, Error>;
