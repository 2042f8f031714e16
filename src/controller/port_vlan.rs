//! Port to VLAN bindings of one switch

use super::{PortId, SwitchId};
use crate::protocol::VlanId;
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// VLAN membership of a configured port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VlanBinding {
    /// Carries exactly one VLAN
    Access(VlanId),
    /// Carries every VLAN; exempt from mismatch checks
    Trunk,
}

impl VlanBinding {
    /// Interpret a configuration value: 1-4094 is an access VLAN, 4095 a trunk.
    pub fn from_config_id(id: u16) -> Result<Self> {
        if id == VlanId::TRUNK_SENTINEL {
            return Ok(VlanBinding::Trunk);
        }
        VlanId::new(id)
            .map(VlanBinding::Access)
            .ok_or(Error::InvalidVlan(id))
    }

    /// Raw id as used on the configuration surface
    pub fn config_id(&self) -> u16 {
        match self {
            VlanBinding::Access(vlan) => vlan.get(),
            VlanBinding::Trunk => VlanId::TRUNK_SENTINEL,
        }
    }

    pub fn is_trunk(&self) -> bool {
        matches!(self, VlanBinding::Trunk)
    }

    /// Whether frames of `vlan` may leave through a port with this binding
    pub fn carries(&self, vlan: VlanId) -> bool {
        match self {
            VlanBinding::Access(own) => *own == vlan,
            VlanBinding::Trunk => true,
        }
    }
}

impl fmt::Display for VlanBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VlanBinding::Access(vlan) => write!(f, "vlan {}", vlan),
            VlanBinding::Trunk => write!(f, "trunk"),
        }
    }
}

/// VLAN binding of every port on a switch
///
/// Ports are registered when the switch connects; a registered port stays
/// unbound until `set_vlan_id` is called for it.
#[derive(Debug, Clone)]
pub struct PortVlanRegistry {
    switch: SwitchId,
    ports: BTreeMap<PortId, Option<VlanBinding>>,
}

impl PortVlanRegistry {
    pub fn new(switch: SwitchId) -> Self {
        Self {
            switch,
            ports: BTreeMap::new(),
        }
    }

    /// Register a port. An existing binding is kept.
    pub fn add_port(&mut self, port: PortId) {
        self.ports.entry(port).or_insert(None);
    }

    /// Forget a port and its binding. Returns false if it was not registered.
    pub fn remove_port(&mut self, port: PortId) -> bool {
        self.ports.remove(&port).is_some()
    }

    pub fn contains(&self, port: PortId) -> bool {
        self.ports.contains_key(&port)
    }

    /// Bind a port to a VLAN (4095 = trunk), replacing any prior binding.
    pub fn set_vlan_id(&mut self, port: PortId, vlan_id: u16) -> Result<VlanBinding> {
        let binding = VlanBinding::from_config_id(vlan_id)?;
        self.set_binding(port, binding)?;
        Ok(binding)
    }

    pub fn set_binding(&mut self, port: PortId, binding: VlanBinding) -> Result<()> {
        let slot = self.ports.get_mut(&port).ok_or(Error::UnknownPort {
            switch: self.switch,
            port,
        })?;
        *slot = Some(binding);
        Ok(())
    }

    /// Binding of a port; `None` for unbound or unknown ports
    pub fn get_vlan_id(&self, port: PortId) -> Option<VlanBinding> {
        self.ports.get(&port).copied().flatten()
    }

    /// Ports eligible to receive a flood of `vlan`, in port order
    pub fn flood_ports(&self, vlan: VlanId, exclude: PortId) -> Vec<PortId> {
        self.ports
            .iter()
            .filter(|&(&port, binding)| {
                port != exclude && binding.is_some_and(|b| b.carries(vlan))
            })
            .map(|(&port, _)| port)
            .collect()
    }

    /// Every registered port except `exclude`, bound or not
    pub fn all_ports_except(&self, exclude: PortId) -> Vec<PortId> {
        self.ports
            .keys()
            .copied()
            .filter(|&port| port != exclude)
            .collect()
    }

    pub fn ports(&self) -> impl Iterator<Item = (PortId, Option<VlanBinding>)> + '_ {
        self.ports.iter().map(|(&port, &binding)| (port, binding))
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}
