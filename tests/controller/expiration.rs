//! Idle expiration of learned entries and the rules resolving to them

use crate::harness::*;
use std::time::Duration;
use vlanflow::controller::{Decision, FloodReason, FlowMatch, PlaneEvent};
use vlanflow::protocol::MacAddr;

fn lab() -> Lab {
    let mut lab = Lab::new(Duration::from_secs(10));
    lab.connect(&[(1, 10), (2, 10), (3, 10)]);
    lab
}

#[test]
fn test_entry_survives_until_timeout_elapses() {
    let mut lab = lab();
    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));

    // Idle for exactly the expiration time is not yet expired
    assert_eq!(lab.expire_at(lab.at(10)), 0);
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_A), Some(1));

    assert_eq!(lab.expire_at(lab.at(11)), 1);
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_A), None);
}

#[test]
fn test_expiry_withdraws_rule() {
    let mut lab = lab();
    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));
    lab.send(2, &frame(MAC_B, MAC_A, None), lab.at(0));
    let flow = FlowMatch {
        vlan: vlan(10),
        dst_mac: MAC_A,
    };
    assert!(lab.plane.installed_rule(SW, &flow).is_some());

    lab.expire_at(lab.at(11));

    assert!(lab.plane.installed_rule(SW, &flow).is_none());
    assert!(lab
        .plane
        .events()
        .iter()
        .any(|e| matches!(e, PlaneEvent::FlowRemoved { flow: f, .. } if *f == flow)));
    assert!(lab.controller.snapshot(SW).expect("connected").rules.is_empty());
    assert_eq!(lab.controller.metrics().entries_expired.get(), 2);
}

#[test]
fn test_traffic_refreshes_entry() {
    let mut lab = lab();
    for secs in [0, 8, 16] {
        lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(secs));
        lab.expire_at(lab.at(secs + 2));
    }
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_A), Some(1));
}

#[test]
fn test_expired_destination_floods_again() {
    let mut lab = lab();
    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));
    lab.expire_at(lab.at(20));
    lab.drain_egress();

    let decision = lab.send(2, &frame(MAC_B, MAC_A, None), lab.at(20));
    assert_eq!(
        decision,
        Decision::Flood {
            vlan: vlan(10),
            ports: vec![1, 3],
            reason: FloodReason::UnknownDestination,
        }
    );
}

#[test]
fn test_changing_expiration_time() {
    let mut lab = lab();
    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));

    lab.controller.set_expiration_time(Duration::ZERO);
    assert_eq!(lab.controller.expiration_time(), Duration::ZERO);
    assert_eq!(lab.expire_at(lab.at(1000)), 0);

    lab.controller.set_expiration_time(Duration::from_secs(5));
    assert_eq!(lab.expire_at(lab.at(1000)), 1);
}

#[test]
fn test_rule_withdrawn_when_entry_outlives_its_push() {
    let mut lab = Lab::new(Duration::from_secs(30));
    lab.connect(&[(1, 10), (2, 10)]);
    let flow = FlowMatch {
        vlan: vlan(10),
        dst_mac: MAC_A,
    };

    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));
    lab.send(2, &frame(MAC_B, MAC_A, None), lab.at(0));
    // A keeps sending; B->A traffic is switched without packet-ins
    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(20));

    lab.expire_at(lab.at(31));
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_A), Some(1));
    assert!(lab.plane.installed_rule(SW, &flow).is_some());

    lab.expire_at(lab.at(51));
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_A), None);
    assert_eq!(lab.plane.installed_rule(SW, &flow), None);
    assert_eq!(lab.controller.metrics().flows_removed.get(), 1);
}
