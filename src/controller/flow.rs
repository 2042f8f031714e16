//! Flow rule installation
//!
//! The controller talks to the switch through [`ForwardingPlane`]. The
//! [`FlowRuleInstaller`] keeps a per-switch record of the rules it pushed so
//! that each (VLAN, destination MAC) maps to at most one rule.

use super::{PortId, SwitchId};
use crate::protocol::{MacAddr, VlanId};
use crate::Result;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

/// Match half of a flow rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlowMatch {
    pub vlan: VlanId,
    pub dst_mac: MacAddr,
}

/// Unicast forwarding rule: frames matching `flow` leave through `out_port`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowRule {
    pub flow: FlowMatch,
    pub out_port: PortId,
    /// Zero means the rule never idles out
    pub idle_timeout: Duration,
}

/// Set of ports a flood is restricted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FloodScope {
    pub exclude_port: PortId,
    pub vlan: VlanId,
    pub ports: Vec<PortId>,
}

/// Operations the controller needs from a switch's forwarding plane.
///
/// Output and flood are fire-and-forget. Only rule installation can fail,
/// e.g. when the switch flow table is full.
pub trait ForwardingPlane {
    fn install_flow(&mut self, switch: SwitchId, rule: &FlowRule) -> Result<()>;

    fn remove_flow(&mut self, switch: SwitchId, flow: &FlowMatch);

    fn output_packet(&mut self, switch: SwitchId, port: PortId, frame: &[u8]);

    fn flood_packet(&mut self, switch: SwitchId, scope: &FloodScope, frame: &[u8]);
}

/// What an install call did to the installer's record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// No rule existed for the match
    Installed,
    /// Same rule re-pushed; the switch resets its idle timer
    Refreshed,
    /// Rule existed with a different output port
    Replaced { previous_port: PortId },
}

#[derive(Debug, Clone)]
struct InstalledRule {
    out_port: PortId,
    idle_timeout: Duration,
}

/// Per-switch record of installed flow rules
#[derive(Debug)]
pub struct FlowRuleInstaller {
    switch: SwitchId,
    rules: HashMap<FlowMatch, InstalledRule>,
}

impl FlowRuleInstaller {
    pub fn new(switch: SwitchId) -> Self {
        Self {
            switch,
            rules: HashMap::new(),
        }
    }

    /// Install or refresh the unique rule for `rule.flow`.
    ///
    /// On failure nothing is recorded, so the next packet-in for the same
    /// match retries. A rule that was being replaced is withdrawn so the
    /// switch never keeps forwarding to the old port.
    ///
    /// The record is kept until [`remove`](Self::remove) withdraws it, even
    /// after the idle timeout: matching traffic keeps the rule alive on the
    /// switch without any packet-in reaching the controller.
    pub fn install<P: ForwardingPlane + ?Sized>(
        &mut self,
        plane: &mut P,
        rule: FlowRule,
    ) -> Result<InstallOutcome> {
        let outcome = match self.rules.get(&rule.flow) {
            None => InstallOutcome::Installed,
            Some(existing) if existing.out_port == rule.out_port => InstallOutcome::Refreshed,
            Some(existing) => InstallOutcome::Replaced {
                previous_port: existing.out_port,
            },
        };

        if let Err(e) = plane.install_flow(self.switch, &rule) {
            warn!(
                "Flow install failed on switch {} (vlan {} dst {}): {}",
                self.switch, rule.flow.vlan, rule.flow.dst_mac, e
            );
            if let InstallOutcome::Replaced { .. } = outcome {
                self.remove(plane, &rule.flow);
            }
            return Err(e);
        }

        debug!(
            "Flow {:?} on switch {}: vlan {} dst {} -> port {} (idle {:?})",
            outcome,
            self.switch,
            rule.flow.vlan,
            rule.flow.dst_mac,
            rule.out_port,
            rule.idle_timeout
        );
        self.rules.insert(
            rule.flow,
            InstalledRule {
                out_port: rule.out_port,
                idle_timeout: rule.idle_timeout,
            },
        );
        Ok(outcome)
    }

    /// Withdraw the rule for `flow`. No-op (returns false) if absent.
    pub fn remove<P: ForwardingPlane + ?Sized>(
        &mut self,
        plane: &mut P,
        flow: &FlowMatch,
    ) -> bool {
        if self.rules.remove(flow).is_none() {
            return false;
        }
        plane.remove_flow(self.switch, flow);
        debug!(
            "Flow removed on switch {}: vlan {} dst {}",
            self.switch, flow.vlan, flow.dst_mac
        );
        true
    }

    /// Withdraw every rule that outputs to `port`.
    pub fn remove_for_port<P: ForwardingPlane + ?Sized>(
        &mut self,
        plane: &mut P,
        port: PortId,
    ) -> usize {
        let flows: Vec<FlowMatch> = self
            .rules
            .iter()
            .filter(|(_, rule)| rule.out_port == port)
            .map(|(flow, _)| *flow)
            .collect();
        for flow in &flows {
            self.remove(plane, flow);
        }
        flows.len()
    }

    pub fn get(&self, flow: &FlowMatch) -> Option<FlowRule> {
        self.rules.get(flow).map(|rule| FlowRule {
            flow: *flow,
            out_port: rule.out_port,
            idle_timeout: rule.idle_timeout,
        })
    }

    /// All recorded rules, ordered by match
    pub fn rules(&self) -> Vec<FlowRule> {
        let mut rules: Vec<FlowRule> = self
            .rules
            .iter()
            .map(|(flow, rule)| FlowRule {
                flow: *flow,
                out_port: rule.out_port,
                idle_timeout: rule.idle_timeout,
            })
            .collect();
        rules.sort_by_key(|r| r.flow);
        rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
