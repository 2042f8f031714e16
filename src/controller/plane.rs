//! In-memory forwarding plane
//!
//! Records every call the controller makes and keeps a per-switch flow table,
//! optionally bounded, so install failures can be exercised.

use super::{FloodScope, FlowMatch, FlowRule, ForwardingPlane, PortId, SwitchId};
use crate::{Error, Result};
use std::collections::HashMap;
use tracing::trace;

/// One call observed by the [`RecordingPlane`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaneEvent {
    FlowInstalled { switch: SwitchId, rule: FlowRule },
    FlowRejected { switch: SwitchId, rule: FlowRule },
    FlowRemoved { switch: SwitchId, flow: FlowMatch },
    Output { switch: SwitchId, port: PortId, frame: Vec<u8> },
    Flood { switch: SwitchId, scope: FloodScope, frame: Vec<u8> },
}

#[derive(Debug, Default)]
pub struct RecordingPlane {
    events: Vec<PlaneEvent>,
    flows: HashMap<SwitchId, HashMap<FlowMatch, FlowRule>>,
    /// Maximum rules per switch; `None` is unbounded
    flow_capacity: Option<usize>,
}

impl RecordingPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_flow_capacity(capacity: usize) -> Self {
        Self {
            flow_capacity: Some(capacity),
            ..Self::default()
        }
    }

    pub fn events(&self) -> &[PlaneEvent] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<PlaneEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn installed_rule(&self, switch: SwitchId, flow: &FlowMatch) -> Option<&FlowRule> {
        self.flows.get(&switch)?.get(flow)
    }

    pub fn flow_count(&self, switch: SwitchId) -> usize {
        self.flows.get(&switch).map_or(0, |t| t.len())
    }

    /// Ports a frame left through, in event order (outputs and floods)
    pub fn egress_ports(&self, switch: SwitchId) -> Vec<PortId> {
        self.events
            .iter()
            .flat_map(|event| match event {
                PlaneEvent::Output { switch: s, port, .. } if *s == switch => vec![*port],
                PlaneEvent::Flood { switch: s, scope, .. } if *s == switch => scope.ports.clone(),
                _ => Vec::new(),
            })
            .collect()
    }
}

impl ForwardingPlane for RecordingPlane {
    fn install_flow(&mut self, switch: SwitchId, rule: &FlowRule) -> Result<()> {
        let table = self.flows.entry(switch).or_default();
        let full = self
            .flow_capacity
            .is_some_and(|cap| table.len() >= cap && !table.contains_key(&rule.flow));

        if full {
            self.events.push(PlaneEvent::FlowRejected {
                switch,
                rule: rule.clone(),
            });
            return Err(Error::FlowInstall {
                switch,
                reason: "flow table full".into(),
            });
        }

        table.insert(rule.flow, rule.clone());
        trace!("plane {}: install {:?}", switch, rule);
        self.events.push(PlaneEvent::FlowInstalled {
            switch,
            rule: rule.clone(),
        });
        Ok(())
    }

    fn remove_flow(&mut self, switch: SwitchId, flow: &FlowMatch) {
        if let Some(table) = self.flows.get_mut(&switch) {
            table.remove(flow);
        }
        trace!("plane {}: remove {:?}", switch, flow);
        self.events.push(PlaneEvent::FlowRemoved {
            switch,
            flow: *flow,
        });
    }

    fn output_packet(&mut self, switch: SwitchId, port: PortId, frame: &[u8]) {
        trace!("plane {}: output {} bytes to port {}", switch, frame.len(), port);
        self.events.push(PlaneEvent::Output {
            switch,
            port,
            frame: frame.to_vec(),
        });
    }

    fn flood_packet(&mut self, switch: SwitchId, scope: &FloodScope, frame: &[u8]) {
        trace!(
            "plane {}: flood {} bytes in vlan {} to {:?}",
            switch,
            frame.len(),
            scope.vlan,
            scope.ports
        );
        self.events.push(PlaneEvent::Flood {
            switch,
            scope: scope.clone(),
            frame: frame.to_vec(),
        });
    }
}
