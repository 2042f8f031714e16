//! Test harness: one controller wired to an in-memory forwarding plane

use std::sync::Arc;
use std::time::{Duration, Instant};
use vlanflow::controller::{
    Controller, ControllerSettings, Decision, ForwardingMode, PacketIn, PortId, RecordingPlane,
    SwitchId, TrunkPolicy,
};
use vlanflow::protocol::ethernet::FrameBuilder;
use vlanflow::protocol::{EtherType, MacAddr, VlanId, VlanTag};
use vlanflow::telemetry::MetricsRegistry;
use vlanflow::Result;

pub const SW: SwitchId = SwitchId(0x1);

pub const MAC_A: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x0a]);
pub const MAC_B: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x0b]);
pub const MAC_C: MacAddr = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x0c]);

pub fn vlan(id: u16) -> VlanId {
    VlanId::new(id).expect("valid vlan id")
}

/// Ethernet frame from `src` to `dst`, 802.1Q-tagged when `vid` is set
pub fn frame(src: MacAddr, dst: MacAddr, vid: Option<u16>) -> Vec<u8> {
    let mut builder = FrameBuilder::new().dst_mac(dst).src_mac(src);
    if let Some(vid) = vid {
        builder = builder.vlan_tag(VlanTag::new(vid));
    }
    builder
        .ethertype(EtherType::Ipv4 as u16)
        .payload(&[0u8; 46])
        .build()
}

pub struct Lab {
    pub controller: Controller,
    pub plane: RecordingPlane,
    pub start: Instant,
}

impl Lab {
    pub fn new(expiration: Duration) -> Self {
        Self::with_settings(ControllerSettings {
            mode: ForwardingMode::VlanEnforcing,
            expiration_time: expiration,
            trunk: TrunkPolicy::default(),
        })
    }

    pub fn with_settings(settings: ControllerSettings) -> Self {
        Self {
            controller: Controller::new(settings, Arc::new(MetricsRegistry::new())),
            plane: RecordingPlane::new(),
            start: Instant::now(),
        }
    }

    /// Connect switch `SW` with the given (port, config vlan id) pairs
    pub fn connect(&mut self, bindings: &[(PortId, u16)]) {
        self.controller
            .connect_switch(SW, bindings.iter().map(|&(port, _)| port));
        for &(port, vlan_id) in bindings {
            self.set_vlan_id(SW, port, vlan_id).expect("binding accepted");
        }
    }

    pub fn set_vlan_id(&mut self, switch: SwitchId, port: PortId, vlan_id: u16) -> Result<()> {
        self.controller.set_vlan_id(&mut self.plane, switch, port, vlan_id)
    }

    pub fn at(&self, secs: u64) -> Instant {
        self.start + Duration::from_secs(secs)
    }

    pub fn send(&mut self, port: PortId, data: &[u8], at: Instant) -> Decision {
        let packet = PacketIn {
            switch: SW,
            in_port: port,
            frame: data,
            timestamp: at,
        };
        self.controller.handle_packet_in(&mut self.plane, &packet)
    }

    pub fn expire_at(&mut self, at: Instant) -> usize {
        self.controller.expire(&mut self.plane, at)
    }

    /// Ports the plane sent frames to since the last call
    pub fn drain_egress(&mut self) -> Vec<PortId> {
        let ports = self.plane.egress_ports(SW);
        self.plane.take_events();
        ports
    }
}
