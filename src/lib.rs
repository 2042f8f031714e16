//! vlanflow - VLAN-aware OpenFlow learning-switch controller
//!
//! Learns where hosts live from packet-ins, installs per-(VLAN, MAC) flow
//! rules on the switch, and confines floods to the ports of the frame's VLAN.

pub mod config;
pub mod controller;
pub mod error;
pub mod protocol;
pub mod telemetry;

pub use error::{Error, Result};
