//! OpenFlow learning-switch controller
//!
//! Per-switch state (port VLAN bindings, MAC learning table, installed flow
//! rules) and the packet-in decision logic that drives it.

mod expiry;
mod flow;
mod mac_table;
mod packet_in;
mod plane;
mod port_vlan;
pub mod service;
mod switch;

pub use expiry::{ExpirationTimer, SweepOutcome, DEFAULT_SWEEP_INTERVAL};
pub use flow::{
    FloodScope, FlowMatch, FlowRule, FlowRuleInstaller, ForwardingPlane, InstallOutcome,
};
pub use mac_table::{LearnedEntry, MacLearningTable};
pub use packet_in::{
    Controller, ControllerSettings, Decision, DropReason, FloodReason, ForwardingMode, PacketIn,
    TrunkPolicy,
};
pub use plane::{PlaneEvent, RecordingPlane};
pub use port_vlan::{PortVlanRegistry, VlanBinding};
pub use service::{ControllerEvent, ControllerHandle, ControllerService};
pub use switch::{SwitchSnapshot, SwitchState};

use std::fmt;

/// Port number, unique within one switch
pub type PortId = u32;

/// Datapath id of an OpenFlow switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SwitchId(pub u64);

impl fmt::Display for SwitchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl From<u64> for SwitchId {
    fn from(dpid: u64) -> Self {
        SwitchId(dpid)
    }
}
