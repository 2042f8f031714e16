//! Packet-in handling
//!
//! Every frame a switch cannot resolve on its own is delivered here. The
//! decision is a total function of the current tables: resolve the ingress
//! VLAN, learn the source, then forward (installing a rule), flood within the
//! VLAN, or drop.

use super::{
    ExpirationTimer, FloodScope, FlowMatch, FlowRule, ForwardingPlane, InstallOutcome, PortId,
    SwitchId, SwitchSnapshot, SwitchState, VlanBinding,
};
use crate::protocol::ethernet::Frame;
use crate::protocol::{MacAddr, VlanId, VlanTag};
use crate::telemetry::MetricsRegistry;
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// How the controller treats VLANs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForwardingMode {
    /// Plain learning switch: bindings and tags are ignored, every frame
    /// belongs to one broadcast domain.
    Learning,
    /// Ports must be bound; frames are confined to their VLAN.
    #[default]
    VlanEnforcing,
}

/// Classification of frames arriving on trunk ports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TrunkPolicy {
    /// VLAN assigned to untagged (or priority-tagged) frames received on a
    /// trunk. Such frames are dropped when unset.
    pub native_vlan: Option<VlanId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerSettings {
    pub mode: ForwardingMode,
    /// Idle time after which learned entries and rules are evicted; zero
    /// disables expiration.
    pub expiration_time: Duration,
    pub trunk: TrunkPolicy,
}

/// A frame the switch handed to the controller
#[derive(Debug, Clone, Copy)]
pub struct PacketIn<'a> {
    pub switch: SwitchId,
    pub in_port: PortId,
    pub frame: &'a [u8],
    pub timestamp: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    UnknownSwitch,
    UnknownPort,
    /// Ingress port has no VLAN binding yet
    UnboundPort,
    /// Tag contradicts the access VLAN of the ingress port
    VlanMismatch { port_vlan: VlanId, frame_vid: u16 },
    /// Untagged frame on a trunk without a native VLAN
    UntaggedOnTrunk,
    /// VID 4095 is reserved on the wire
    ReservedVid,
    Malformed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloodReason {
    UnknownDestination,
    /// Destination was learned on the ingress port
    SamePort,
    /// Destination known but the switch refused the rule
    InstallFailed,
}

/// Outcome of one packet-in
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Forward {
        port: PortId,
        rule: InstallOutcome,
    },
    Flood {
        vlan: VlanId,
        ports: Vec<PortId>,
        reason: FloodReason,
    },
    Drop(DropReason),
}

/// Learning-switch controller managing any number of switches
#[derive(Debug)]
pub struct Controller {
    mode: ForwardingMode,
    trunk: TrunkPolicy,
    expiration: ExpirationTimer,
    switches: HashMap<SwitchId, SwitchState>,
    metrics: Arc<MetricsRegistry>,
}

impl Controller {
    pub fn new(settings: ControllerSettings, metrics: Arc<MetricsRegistry>) -> Self {
        Self {
            mode: settings.mode,
            trunk: settings.trunk,
            expiration: ExpirationTimer::new(settings.expiration_time),
            switches: HashMap::new(),
            metrics,
        }
    }

    pub fn mode(&self) -> ForwardingMode {
        self.mode
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn expiration_time(&self) -> Duration {
        self.expiration.expiration_time()
    }

    /// Change the idle expiration time. Zero disables expiration.
    ///
    /// Applies to rules installed from now on and to the next sweep.
    pub fn set_expiration_time(&mut self, expiration_time: Duration) {
        self.expiration = ExpirationTimer::new(expiration_time);
        info!("Expiration time set to {:?}", expiration_time);
    }

    // ========================================
    // Switch lifecycle
    // ========================================

    /// Register a switch and its ports.
    ///
    /// A switch that reconnects starts with empty learning and flow tables;
    /// bindings of ports it still reports are kept.
    pub fn connect_switch(&mut self, switch: SwitchId, ports: impl IntoIterator<Item = PortId>) {
        let mut state = SwitchState::new(switch, ports);
        if let Some(old) = self.switches.remove(&switch) {
            for (port, binding) in old.ports.ports() {
                if let Some(binding) = binding {
                    // Ports the switch no longer reports are skipped
                    let _ = state.ports.set_binding(port, binding);
                }
            }
            info!("Switch {} reconnected, tables cleared", switch);
        } else {
            info!("Switch {} connected with {} ports", switch, state.ports.len());
        }
        self.switches.insert(switch, state);
        self.metrics.register_switch(switch);
        self.update_gauges();
    }

    /// Tear down a switch, discarding all of its tables.
    pub fn disconnect_switch(&mut self, switch: SwitchId) -> bool {
        let removed = self.switches.remove(&switch).is_some();
        if removed {
            info!("Switch {} disconnected", switch);
            self.update_gauges();
        }
        removed
    }

    pub fn add_port(&mut self, switch: SwitchId, port: PortId) -> Result<()> {
        self.switch_mut(switch)?.ports.add_port(port);
        debug!("Port {} added on switch {}", port, switch);
        Ok(())
    }

    /// Remove a port, purging addresses learned on it and rules pointing at it.
    pub fn remove_port<P: ForwardingPlane + ?Sized>(
        &mut self,
        plane: &mut P,
        switch: SwitchId,
        port: PortId,
    ) -> Result<()> {
        let state = self.switch_mut(switch)?;
        if !state.ports.remove_port(port) {
            return Err(Error::UnknownPort { switch, port });
        }
        let purged = state.macs.remove_port(port);
        let withdrawn = state.flows.remove_for_port(plane, port);
        debug!(
            "Port {} removed on switch {}: {} entries purged, {} rules withdrawn",
            port,
            switch,
            purged.len(),
            withdrawn
        );
        self.metrics.flows_removed.add(withdrawn as u64);
        self.update_gauges();
        Ok(())
    }

    pub fn is_connected(&self, switch: SwitchId) -> bool {
        self.switches.contains_key(&switch)
    }

    pub fn switch_ids(&self) -> Vec<SwitchId> {
        let mut ids: Vec<SwitchId> = self.switches.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn switch(&self, switch: SwitchId) -> Option<&SwitchState> {
        self.switches.get(&switch)
    }

    pub fn snapshot(&self, switch: SwitchId) -> Option<SwitchSnapshot> {
        self.switches.get(&switch).map(SwitchState::snapshot)
    }

    fn switch_mut(&mut self, switch: SwitchId) -> Result<&mut SwitchState> {
        self.switches
            .get_mut(&switch)
            .ok_or(Error::UnknownSwitch { switch })
    }

    // ========================================
    // VLAN configuration
    // ========================================

    /// Bind a port to a VLAN; 4095 marks it as a trunk.
    ///
    /// When the binding changes, addresses learned on the port and rules
    /// pointing at it are dropped so no frame follows them across the old
    /// VLAN boundary.
    pub fn set_vlan_id<P: ForwardingPlane + ?Sized>(
        &mut self,
        plane: &mut P,
        switch: SwitchId,
        port: PortId,
        vlan_id: u16,
    ) -> Result<()> {
        let state = self.switch_mut(switch)?;
        let previous = state.ports.get_vlan_id(port);
        let binding = state.ports.set_vlan_id(port, vlan_id)?;
        info!("Switch {} port {} bound to {}", switch, port, binding);

        if previous.is_some_and(|old| old != binding) {
            let purged = state.macs.remove_port(port);
            let withdrawn = state.flows.remove_for_port(plane, port);
            debug!(
                "Switch {} port {} rebound: {} entries purged, {} rules withdrawn",
                switch,
                port,
                purged.len(),
                withdrawn
            );
            self.metrics.flows_removed.add(withdrawn as u64);
            self.update_gauges();
        }
        Ok(())
    }

    /// Binding of a port; `None` when unbound or unknown
    pub fn get_vlan_id(&self, switch: SwitchId, port: PortId) -> Option<VlanBinding> {
        self.switches.get(&switch)?.ports.get_vlan_id(port)
    }

    /// Current learned port for (vlan, mac) on a switch
    pub fn lookup(&self, switch: SwitchId, vlan: VlanId, mac: &MacAddr) -> Option<PortId> {
        self.switches.get(&switch)?.macs.lookup(vlan, mac)
    }

    // ========================================
    // Packet-in
    // ========================================

    /// Decide what to do with a frame and carry it out on `plane`.
    pub fn handle_packet_in<P: ForwardingPlane + ?Sized>(
        &mut self,
        plane: &mut P,
        packet: &PacketIn<'_>,
    ) -> Decision {
        self.metrics.packet_ins.inc();
        self.metrics.record_packet_in(packet.switch, packet.frame.len());

        let decision = self.decide(plane, packet);
        match &decision {
            Decision::Forward { .. } => self.metrics.packets_forwarded.inc(),
            Decision::Flood { .. } => self.metrics.packets_flooded.inc(),
            Decision::Drop(reason) => {
                self.metrics.record_drop(*reason);
                self.metrics.record_switch_drop(packet.switch);
            }
        }
        self.update_gauges();
        decision
    }

    fn decide<P: ForwardingPlane + ?Sized>(
        &mut self,
        plane: &mut P,
        packet: &PacketIn<'_>,
    ) -> Decision {
        let PacketIn {
            switch: switch_id,
            in_port,
            frame: raw,
            timestamp: now,
        } = *packet;

        let Some(state) = self.switches.get_mut(&switch_id) else {
            warn!("Packet-in from unknown switch {}", switch_id);
            return Decision::Drop(DropReason::UnknownSwitch);
        };

        let frame = match Frame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                trace!("Switch {} port {}: {}", switch_id, in_port, e);
                return Decision::Drop(DropReason::Malformed);
            }
        };

        if !state.ports.contains(in_port) {
            debug!("Switch {}: packet-in on unknown port {}", switch_id, in_port);
            return Decision::Drop(DropReason::UnknownPort);
        }

        // Step 1: ingress VLAN
        let vlan = match self.mode {
            ForwardingMode::Learning => VlanId::DEFAULT,
            ForwardingMode::VlanEnforcing => {
                match classify(state.ports.get_vlan_id(in_port), frame.vlan_tag(), self.trunk) {
                    Ok(vlan) => vlan,
                    Err(reason) => {
                        info!(
                            "Switch {} port {}: dropping frame {} -> {} ({:?})",
                            switch_id,
                            in_port,
                            frame.src_mac(),
                            frame.dst_mac(),
                            reason
                        );
                        return Decision::Drop(reason);
                    }
                }
            }
        };

        let src = frame.src_mac();
        let dst = frame.dst_mac();

        // Step 2: learn
        if src.is_learnable() {
            let moved_from = state.macs.learn(vlan, src, in_port, now);
            self.metrics.macs_learned.inc();
            if let Some(old_port) = moved_from {
                debug!(
                    "Switch {}: {} moved in vlan {} from port {} to {}",
                    switch_id, src, vlan, old_port, in_port
                );
                self.metrics.mac_moves.inc();
                let stale = FlowMatch { vlan, dst_mac: src };
                if state.flows.remove(plane, &stale) {
                    self.metrics.flows_removed.inc();
                }
            }
        }

        // Step 3: resolve destination
        let resolved = if dst.is_unicast() {
            state
                .macs
                .lookup_fresh(vlan, &dst, now, self.expiration.idle_timeout())
        } else {
            None
        };
        // Never unicast out of a port that no longer carries the VLAN
        let resolved = resolved.filter(|&port| match self.mode {
            ForwardingMode::Learning => true,
            ForwardingMode::VlanEnforcing => state
                .ports
                .get_vlan_id(port)
                .is_some_and(|binding| binding.carries(vlan)),
        });

        // Step 4: known unicast on another port
        let reason = match resolved {
            Some(out_port) if out_port != in_port => {
                let rule = FlowRule {
                    flow: FlowMatch { vlan, dst_mac: dst },
                    out_port,
                    idle_timeout: self.expiration.expiration_time(),
                };
                match state.flows.install(plane, rule) {
                    Ok(outcome) => {
                        match outcome {
                            InstallOutcome::Refreshed => self.metrics.flows_refreshed.inc(),
                            _ => self.metrics.flows_installed.inc(),
                        }
                        plane.output_packet(switch_id, out_port, raw);
                        trace!(
                            "Switch {}: {} -> {} forwarded to port {}",
                            switch_id,
                            src,
                            dst,
                            out_port
                        );
                        return Decision::Forward {
                            port: out_port,
                            rule: outcome,
                        };
                    }
                    Err(_) => {
                        self.metrics.flow_install_failures.inc();
                        FloodReason::InstallFailed
                    }
                }
            }
            Some(_) => FloodReason::SamePort,
            None => FloodReason::UnknownDestination,
        };

        // Step 5: flood within the VLAN
        let ports = match self.mode {
            ForwardingMode::Learning => state.ports.all_ports_except(in_port),
            ForwardingMode::VlanEnforcing => state.ports.flood_ports(vlan, in_port),
        };
        let scope = FloodScope {
            exclude_port: in_port,
            vlan,
            ports,
        };
        plane.flood_packet(switch_id, &scope, raw);
        trace!(
            "Switch {}: {} -> {} flooded in vlan {} to {:?} ({:?})",
            switch_id,
            src,
            dst,
            vlan,
            scope.ports,
            reason
        );

        Decision::Flood {
            vlan,
            ports: scope.ports,
            reason,
        }
    }

    // ========================================
    // Expiration
    // ========================================

    /// Evict idle entries and their rules on every switch.
    pub fn expire<P: ForwardingPlane + ?Sized>(&mut self, plane: &mut P, now: Instant) -> usize {
        let mut evicted = 0;
        let mut withdrawn = 0;
        for state in self.switches.values_mut() {
            let outcome = self.expiration.sweep(state, plane, now);
            evicted += outcome.evicted;
            withdrawn += outcome.rules_withdrawn;
        }

        if evicted > 0 {
            self.metrics.entries_expired.add(evicted as u64);
            debug!("Expiration sweep evicted {} entries", evicted);
        }
        self.metrics.flows_removed.add(withdrawn as u64);
        self.update_gauges();
        evicted
    }

    fn update_gauges(&self) {
        let (macs, rules) = self
            .switches
            .values()
            .fold((0, 0), |(m, r), s| (m + s.macs.len(), r + s.flows.len()));
        self.metrics.set_mac_table_size(macs);
        self.metrics.set_flow_table_size(rules);
    }
}

/// Resolve the VLAN a frame belongs to from the ingress port binding and
/// the frame's 802.1Q tag.
fn classify(
    binding: Option<VlanBinding>,
    tag: Option<VlanTag>,
    trunk: TrunkPolicy,
) -> std::result::Result<VlanId, DropReason> {
    let binding = binding.ok_or(DropReason::UnboundPort)?;
    // VID 0 only carries priority
    let tag = tag.filter(|t| !t.is_priority_only());

    if let Some(tag) = tag {
        if tag.vid == VlanId::TRUNK_SENTINEL {
            return Err(DropReason::ReservedVid);
        }
    }

    match (binding, tag) {
        (VlanBinding::Access(port_vlan), None) => Ok(port_vlan),
        (VlanBinding::Access(port_vlan), Some(tag)) if tag.vid == port_vlan.get() => Ok(port_vlan),
        (VlanBinding::Access(port_vlan), Some(tag)) => Err(DropReason::VlanMismatch {
            port_vlan,
            frame_vid: tag.vid,
        }),
        (VlanBinding::Trunk, Some(tag)) => tag.vlan_id().ok_or(DropReason::ReservedVid),
        (VlanBinding::Trunk, None) => trunk.native_vlan.ok_or(DropReason::UntaggedOnTrunk),
    }
}
