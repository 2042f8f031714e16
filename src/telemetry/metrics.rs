//! Metrics collection for controller activity.
//!
//! Provides thread-safe counters for tracking packet-in decisions and
//! table churn, globally and per switch.

use crate::controller::{DropReason, SwitchId};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

/// Atomic counter for thread-safe increment operations.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, val: u64) {
        self.0.fetch_add(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Per-switch statistics.
#[derive(Debug, Default)]
pub struct SwitchStats {
    /// Number of packet-ins received.
    pub packet_ins: Counter,
    /// Bytes carried by those packet-ins.
    pub packet_in_bytes: Counter,
    /// Number of packet-ins dropped.
    pub drops: Counter,
}

impl SwitchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_packet_in(&self, bytes: usize) {
        self.packet_ins.inc();
        self.packet_in_bytes.add(bytes as u64);
    }
}

/// Global metrics registry for the controller.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    /// Per-switch statistics, keyed by datapath id.
    switches: RwLock<BTreeMap<SwitchId, SwitchStats>>,

    /// Number of packet-ins handled.
    pub packet_ins: Counter,

    // Decisions
    /// Packet-ins forwarded through a single port.
    pub packets_forwarded: Counter,
    /// Packet-ins flooded within their VLAN.
    pub packets_flooded: Counter,
    /// Drops caused by VLAN classification (mismatch, trunk, reserved VID).
    pub vlan_drops: Counter,
    /// Drops on ports with no VLAN binding.
    pub unbound_drops: Counter,
    /// Drops for unknown switch/port or unparseable frames.
    pub other_drops: Counter,

    // Learning
    /// Source addresses learned or refreshed.
    pub macs_learned: Counter,
    /// Addresses seen on a different port than before.
    pub mac_moves: Counter,
    /// Learned entries evicted by expiration.
    pub entries_expired: Counter,

    // Flow rules
    pub flows_installed: Counter,
    pub flows_refreshed: Counter,
    pub flows_removed: Counter,
    pub flow_install_failures: Counter,

    // Table size gauges
    /// Learned entries across all switches.
    pub mac_table_size: AtomicU64,
    /// Recorded flow rules across all switches.
    pub flow_table_size: AtomicU64,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a switch for statistics tracking.
    pub fn register_switch(&self, switch: SwitchId) {
        if let Ok(mut switches) = self.switches.write() {
            switches.entry(switch).or_default();
        }
    }

    /// Records a packet-in from a switch, registering it on first sight.
    pub fn record_packet_in(&self, switch: SwitchId, bytes: usize) {
        if let Ok(switches) = self.switches.read() {
            if let Some(stats) = switches.get(&switch) {
                stats.record_packet_in(bytes);
                return;
            }
        }
        if let Ok(mut switches) = self.switches.write() {
            switches.entry(switch).or_default().record_packet_in(bytes);
        }
    }

    /// Records a dropped packet-in under the counter for its reason.
    pub fn record_drop(&self, reason: DropReason) {
        match reason {
            DropReason::UnboundPort => self.unbound_drops.inc(),
            DropReason::VlanMismatch { .. }
            | DropReason::UntaggedOnTrunk
            | DropReason::ReservedVid => self.vlan_drops.inc(),
            DropReason::UnknownSwitch | DropReason::UnknownPort | DropReason::Malformed => {
                self.other_drops.inc()
            }
        }
    }

    /// Records a drop attributed to a specific switch.
    pub fn record_switch_drop(&self, switch: SwitchId) {
        if let Ok(switches) = self.switches.read() {
            if let Some(stats) = switches.get(&switch) {
                stats.drops.inc();
            }
        }
    }

    pub fn packets_dropped(&self) -> u64 {
        self.vlan_drops.get() + self.unbound_drops.get() + self.other_drops.get()
    }

    pub fn set_mac_table_size(&self, size: usize) {
        self.mac_table_size.store(size as u64, Ordering::Relaxed);
    }

    pub fn set_flow_table_size(&self, size: usize) {
        self.flow_table_size.store(size as u64, Ordering::Relaxed);
    }

    /// Exports all metrics as key-value pairs.
    pub fn export(&self) -> Vec<(String, u64)> {
        let mut result = vec![
            ("packet_ins".into(), self.packet_ins.get()),
            ("packets_forwarded".into(), self.packets_forwarded.get()),
            ("packets_flooded".into(), self.packets_flooded.get()),
            ("packets_dropped".into(), self.packets_dropped()),
            ("vlan_drops".into(), self.vlan_drops.get()),
            ("unbound_drops".into(), self.unbound_drops.get()),
            ("other_drops".into(), self.other_drops.get()),
            ("macs_learned".into(), self.macs_learned.get()),
            ("mac_moves".into(), self.mac_moves.get()),
            ("entries_expired".into(), self.entries_expired.get()),
            ("flows_installed".into(), self.flows_installed.get()),
            ("flows_refreshed".into(), self.flows_refreshed.get()),
            ("flows_removed".into(), self.flows_removed.get()),
            (
                "flow_install_failures".into(),
                self.flow_install_failures.get(),
            ),
            (
                "mac_table_size".into(),
                self.mac_table_size.load(Ordering::Relaxed),
            ),
            (
                "flow_table_size".into(),
                self.flow_table_size.load(Ordering::Relaxed),
            ),
        ];

        // Per-switch metrics
        if let Ok(switches) = self.switches.read() {
            for (id, stats) in switches.iter() {
                result.extend([
                    (format!("switch_{}_packet_ins", id), stats.packet_ins.get()),
                    (
                        format!("switch_{}_packet_in_bytes", id),
                        stats.packet_in_bytes.get(),
                    ),
                    (format!("switch_{}_drops", id), stats.drops.get()),
                ]);
            }
        }

        result
    }
}
