//! End-to-end packet-in scenarios on a single switch
//!
//! Port layout used throughout: port1 = VLAN 10, port2 = VLAN 10,
//! port3 = trunk (4095).

use crate::harness::*;
use std::time::Duration;
use vlanflow::controller::{
    Decision, DropReason, FloodReason, FlowMatch, InstallOutcome, PlaneEvent,
};
use vlanflow::protocol::MacAddr;

const LAYOUT: &[(u32, u16)] = &[(1, 10), (2, 10), (3, 4095)];

fn lab() -> Lab {
    let mut lab = Lab::new(Duration::from_secs(60));
    lab.connect(LAYOUT);
    lab
}

#[test]
fn test_learn_then_flood_within_vlan() {
    let mut lab = lab();
    let t = lab.at(0);

    // Untagged frame from A on port1 to a host nobody has seen yet
    let decision = lab.send(1, &frame(MAC_A, MAC_C, None), t);
    assert_eq!(
        decision,
        Decision::Flood {
            vlan: vlan(10),
            ports: vec![2, 3],
            reason: FloodReason::UnknownDestination,
        }
    );
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_A), Some(1));
    lab.drain_egress();

    // Broadcast from B on port1 reaches port2 and the trunk only
    lab.send(1, &frame(MAC_B, MacAddr::BROADCAST, None), t);
    assert_eq!(lab.drain_egress(), vec![2, 3]);
}

#[test]
fn test_tagged_frame_on_trunk_forwards_to_learned_port() {
    let mut lab = lab();
    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));
    lab.drain_egress();

    let decision = lab.send(3, &frame(MAC_C, MAC_A, Some(10)), lab.at(1));
    assert_eq!(
        decision,
        Decision::Forward {
            port: 1,
            rule: InstallOutcome::Installed,
        }
    );
    // Never port2, even though it shares the VLAN
    assert_eq!(lab.drain_egress(), vec![1]);

    let flow = FlowMatch {
        vlan: vlan(10),
        dst_mac: MAC_A,
    };
    let rule = lab.plane.installed_rule(SW, &flow).expect("rule installed");
    assert_eq!(rule.out_port, 1);
    assert_eq!(rule.idle_timeout, Duration::from_secs(60));

    // The sender behind the trunk is learned in VLAN 10
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_C), Some(3));
}

#[test]
fn test_disabled_expiration_keeps_entries() {
    let mut lab = Lab::new(Duration::ZERO);
    lab.connect(LAYOUT);
    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));

    // 1000 times longer than a 300 second timeout would allow
    let much_later = lab.at(300 * 1000);
    assert_eq!(lab.controller.expire(&mut lab.plane, much_later), 0);
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_A), Some(1));

    let decision = lab.send(2, &frame(MAC_B, MAC_A, None), much_later);
    assert!(matches!(decision, Decision::Forward { port: 1, .. }));
    let flow = FlowMatch {
        vlan: vlan(10),
        dst_mac: MAC_A,
    };
    assert_eq!(
        lab.plane.installed_rule(SW, &flow).map(|r| r.idle_timeout),
        Some(Duration::ZERO)
    );
}

#[test]
fn test_vlan_mismatch_dropped_without_learning() {
    let mut lab = lab();
    let before = lab.controller.snapshot(SW).expect("connected").learned;

    let decision = lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, Some(20)), lab.at(0));
    assert_eq!(
        decision,
        Decision::Drop(DropReason::VlanMismatch {
            port_vlan: vlan(10),
            frame_vid: 20,
        })
    );

    assert_eq!(lab.controller.snapshot(SW).expect("connected").learned, before);
    assert!(lab.plane.events().is_empty());
    assert_eq!(lab.controller.metrics().vlan_drops.get(), 1);
}

#[test]
fn test_vlans_do_not_leak() {
    let mut lab = Lab::new(Duration::from_secs(60));
    lab.connect(&[(1, 10), (2, 20), (3, 4095), (4, 20)]);

    // Same MAC in two VLANs is learned independently
    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));
    lab.send(2, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_A), Some(1));
    assert_eq!(lab.controller.lookup(SW, vlan(20), &MAC_A), Some(2));
    lab.drain_egress();

    // VLAN 20 traffic to A resolves to port2, not port1
    let decision = lab.send(4, &frame(MAC_B, MAC_A, None), lab.at(1));
    assert!(matches!(decision, Decision::Forward { port: 2, .. }));

    // A VLAN 20 broadcast never reaches the VLAN 10 port
    lab.drain_egress();
    lab.send(3, &frame(MAC_C, MacAddr::BROADCAST, Some(20)), lab.at(2));
    assert_eq!(lab.drain_egress(), vec![2, 4]);
}

#[test]
fn test_repeated_traffic_refreshes_single_rule() {
    let mut lab = lab();
    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));

    for secs in 1..=3 {
        lab.send(2, &frame(MAC_B, MAC_A, None), lab.at(secs));
    }

    assert_eq!(lab.plane.flow_count(SW), 1);
    let installs = lab
        .plane
        .events()
        .iter()
        .filter(|e| matches!(e, PlaneEvent::FlowInstalled { .. }))
        .count();
    assert_eq!(installs, 3);
    assert_eq!(lab.controller.metrics().flows_installed.get(), 1);
    assert_eq!(lab.controller.metrics().flows_refreshed.get(), 2);
}

#[test]
fn test_multicast_source_not_learned() {
    let mut lab = lab();
    let multicast = MacAddr([0x01, 0x00, 0x5e, 0x00, 0x00, 0x01]);

    lab.send(1, &frame(multicast, MacAddr::BROADCAST, None), lab.at(0));
    assert_eq!(lab.controller.lookup(SW, vlan(10), &multicast), None);
    assert_eq!(lab.drain_egress(), vec![2, 3]);
}
