//! MAC learning table
//!
//! Maps source addresses observed on packet-ins to the port they arrived on,
//! separately for each VLAN (Independent VLAN Learning). Each entry carries
//! the timestamp of its most recent sighting so idle entries can be evicted.

use super::PortId;
use crate::protocol::{MacAddr, VlanId};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct Entry {
    port: PortId,
    last_seen: Instant,
}

/// Read-only view of one learned address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LearnedEntry {
    pub vlan: VlanId,
    pub mac: MacAddr,
    pub port: PortId,
    pub last_seen: Instant,
}

/// Per-switch learning table keyed by (VLAN, MAC)
///
/// Holds at most one entry per (VLAN, MAC); a new sighting overwrites the
/// port and refreshes the timestamp.
#[derive(Debug, Default)]
pub struct MacLearningTable {
    /// VLAN ID -> (MAC -> Entry)
    tables: HashMap<VlanId, HashMap<MacAddr, Entry>>,
}

impl MacLearningTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `mac` was seen on `port` in `vlan` at `now`.
    ///
    /// Returns the previous port when the address moved.
    pub fn learn(
        &mut self,
        vlan: VlanId,
        mac: MacAddr,
        port: PortId,
        now: Instant,
    ) -> Option<PortId> {
        let previous = self
            .tables
            .entry(vlan)
            .or_default()
            .insert(
                mac,
                Entry {
                    port,
                    last_seen: now,
                },
            )
            .map(|old| old.port);

        previous.filter(|&old| old != port)
    }

    pub fn lookup(&self, vlan: VlanId, mac: &MacAddr) -> Option<PortId> {
        self.tables.get(&vlan)?.get(mac).map(|entry| entry.port)
    }

    /// Like `lookup`, but treats entries idle for longer than `idle_timeout`
    /// as absent. `None` disables the check.
    pub fn lookup_fresh(
        &self,
        vlan: VlanId,
        mac: &MacAddr,
        now: Instant,
        idle_timeout: Option<Duration>,
    ) -> Option<PortId> {
        let entry = self.tables.get(&vlan)?.get(mac)?;
        match idle_timeout {
            Some(idle) if now.saturating_duration_since(entry.last_seen) > idle => None,
            _ => Some(entry.port),
        }
    }

    pub fn last_seen(&self, vlan: VlanId, mac: &MacAddr) -> Option<Instant> {
        self.tables.get(&vlan)?.get(mac).map(|entry| entry.last_seen)
    }

    /// Remove entries idle for longer than `idle_timeout`.
    ///
    /// A zero timeout means entries never expire. Returns the evicted keys.
    pub fn expire(&mut self, now: Instant, idle_timeout: Duration) -> Vec<(VlanId, MacAddr)> {
        let mut evicted = Vec::new();
        if idle_timeout.is_zero() {
            return evicted;
        }

        for (&vlan, table) in self.tables.iter_mut() {
            table.retain(|&mac, entry| {
                let keep = now.saturating_duration_since(entry.last_seen) <= idle_timeout;
                if !keep {
                    evicted.push((vlan, mac));
                }
                keep
            });
        }
        self.tables.retain(|_, table| !table.is_empty());

        evicted
    }

    /// Remove every entry learned on `port`, e.g. when the port goes away.
    pub fn remove_port(&mut self, port: PortId) -> Vec<(VlanId, MacAddr)> {
        let mut removed = Vec::new();
        for (&vlan, table) in self.tables.iter_mut() {
            table.retain(|&mac, entry| {
                if entry.port == port {
                    removed.push((vlan, mac));
                    false
                } else {
                    true
                }
            });
        }
        self.tables.retain(|_, table| !table.is_empty());
        removed
    }

    /// All entries, ordered by VLAN then MAC
    pub fn entries(&self) -> Vec<LearnedEntry> {
        let mut entries: Vec<LearnedEntry> = self
            .tables
            .iter()
            .flat_map(|(&vlan, table)| {
                table.iter().map(move |(&mac, entry)| LearnedEntry {
                    vlan,
                    mac,
                    port: entry.port,
                    last_seen: entry.last_seen,
                })
            })
            .collect();
        entries.sort_by_key(|e| (e.vlan, e.mac));
        entries
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }

    pub fn len(&self) -> usize {
        self.tables.values().map(|t| t.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len_in_vlan(&self, vlan: VlanId) -> usize {
        self.tables.get(&vlan).map_or(0, |t| t.len())
    }
}
