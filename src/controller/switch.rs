//! State owned by the controller for one connected switch

use super::{
    FlowRule, FlowRuleInstaller, LearnedEntry, MacLearningTable, PortId, PortVlanRegistry,
    SwitchId, VlanBinding,
};

/// Tables of one switch. Switches never share state.
#[derive(Debug)]
pub struct SwitchState {
    id: SwitchId,
    pub ports: PortVlanRegistry,
    pub macs: MacLearningTable,
    pub flows: FlowRuleInstaller,
}

/// Point-in-time copy of a switch's tables
#[derive(Debug, Clone)]
pub struct SwitchSnapshot {
    pub id: SwitchId,
    pub ports: Vec<(PortId, Option<VlanBinding>)>,
    pub learned: Vec<LearnedEntry>,
    pub rules: Vec<FlowRule>,
}

impl SwitchState {
    pub fn new(id: SwitchId, ports: impl IntoIterator<Item = PortId>) -> Self {
        let mut registry = PortVlanRegistry::new(id);
        for port in ports {
            registry.add_port(port);
        }
        Self {
            id,
            ports: registry,
            macs: MacLearningTable::new(),
            flows: FlowRuleInstaller::new(id),
        }
    }

    pub fn id(&self) -> SwitchId {
        self.id
    }

    pub fn snapshot(&self) -> SwitchSnapshot {
        SwitchSnapshot {
            id: self.id,
            ports: self.ports.ports().collect(),
            learned: self.macs.entries(),
            rules: self.flows.rules(),
        }
    }
}
