//! Switch and port lifecycle, MAC moves and install failures

use crate::harness::*;
use std::time::Duration;
use vlanflow::controller::{
    ControllerSettings, Decision, DropReason, FloodReason, FlowMatch, ForwardingMode,
    RecordingPlane, SwitchId, TrunkPolicy, VlanBinding,
};
use vlanflow::protocol::MacAddr;
use vlanflow::Error;

#[test]
fn test_unbound_port_drops_until_configured() {
    let mut lab = Lab::new(Duration::from_secs(30));
    lab.controller.connect_switch(SW, [1, 2]);

    let data = frame(MAC_A, MacAddr::BROADCAST, None);
    assert_eq!(
        lab.send(1, &data, lab.at(0)),
        Decision::Drop(DropReason::UnboundPort)
    );
    assert_eq!(lab.controller.get_vlan_id(SW, 1), None);

    lab.set_vlan_id(SW, 1, 10).expect("valid binding");
    assert!(matches!(lab.send(1, &data, lab.at(1)), Decision::Flood { .. }));
}

#[test]
fn test_set_vlan_id_validation() {
    let mut lab = Lab::new(Duration::from_secs(30));
    lab.controller.connect_switch(SW, [1]);

    assert!(matches!(
        lab.set_vlan_id(SW, 1, 0),
        Err(Error::InvalidVlan(0))
    ));
    assert!(matches!(
        lab.set_vlan_id(SW, 1, 4096),
        Err(Error::InvalidVlan(4096))
    ));
    assert!(matches!(
        lab.set_vlan_id(SW, 7, 10),
        Err(Error::UnknownPort { port: 7, .. })
    ));
    assert!(matches!(
        lab.set_vlan_id(SwitchId(99), 1, 10),
        Err(Error::UnknownSwitch { .. })
    ));

    lab.set_vlan_id(SW, 1, 4095).expect("trunk binding");
    assert_eq!(lab.controller.get_vlan_id(SW, 1), Some(VlanBinding::Trunk));
}

#[test]
fn test_untagged_on_trunk_uses_native_vlan() {
    let settings = ControllerSettings {
        mode: ForwardingMode::VlanEnforcing,
        expiration_time: Duration::from_secs(30),
        trunk: TrunkPolicy {
            native_vlan: Some(vlan(10)),
        },
    };
    let mut lab = Lab::with_settings(settings);
    lab.connect(&[(1, 10), (2, 20), (3, 4095)]);

    let decision = lab.send(3, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));
    assert_eq!(
        decision,
        Decision::Flood {
            vlan: vlan(10),
            ports: vec![1],
            reason: FloodReason::UnknownDestination,
        }
    );

    // Without a native VLAN the same frame is dropped
    let mut strict = Lab::new(Duration::from_secs(30));
    strict.connect(&[(1, 10), (3, 4095)]);
    assert_eq!(
        strict.send(3, &frame(MAC_A, MacAddr::BROADCAST, None), strict.at(0)),
        Decision::Drop(DropReason::UntaggedOnTrunk)
    );
}

#[test]
fn test_mac_move_replaces_rule() {
    let mut lab = Lab::new(Duration::from_secs(30));
    lab.connect(&[(1, 10), (2, 10), (3, 10)]);
    let flow = FlowMatch {
        vlan: vlan(10),
        dst_mac: MAC_A,
    };

    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));
    lab.send(2, &frame(MAC_B, MAC_A, None), lab.at(0));
    assert_eq!(lab.plane.installed_rule(SW, &flow).map(|r| r.out_port), Some(1));

    // A moves to port3; the old rule is withdrawn immediately
    lab.send(3, &frame(MAC_A, MAC_B, None), lab.at(1));
    assert_eq!(lab.plane.installed_rule(SW, &flow), None);

    // Next frame to A installs the rule towards the new port
    let decision = lab.send(2, &frame(MAC_B, MAC_A, None), lab.at(2));
    assert!(matches!(decision, Decision::Forward { port: 3, .. }));
    assert_eq!(lab.plane.installed_rule(SW, &flow).map(|r| r.out_port), Some(3));
}

#[test]
fn test_full_flow_table_falls_back_to_flood() {
    let mut lab = Lab::new(Duration::from_secs(30));
    lab.plane = RecordingPlane::with_flow_capacity(1);
    lab.connect(&[(1, 10), (2, 10), (3, 10)]);

    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));
    lab.send(2, &frame(MAC_B, MacAddr::BROADCAST, None), lab.at(0));
    assert!(matches!(
        lab.send(3, &frame(MAC_C, MAC_A, None), lab.at(0)),
        Decision::Forward { port: 1, .. }
    ));
    lab.drain_egress();

    // Second rule does not fit: frame still reaches B through the VLAN flood
    let decision = lab.send(3, &frame(MAC_C, MAC_B, None), lab.at(0));
    assert_eq!(
        decision,
        Decision::Flood {
            vlan: vlan(10),
            ports: vec![1, 2],
            reason: FloodReason::InstallFailed,
        }
    );
    assert_eq!(lab.drain_egress(), vec![1, 2]);
    assert_eq!(lab.plane.flow_count(SW), 1);
}

#[test]
fn test_switches_are_isolated() {
    let mut lab = Lab::new(Duration::from_secs(30));
    lab.connect(&[(1, 10), (2, 10)]);
    let other = SwitchId(2);
    lab.controller.connect_switch(other, [1, 2]);
    lab.set_vlan_id(other, 1, 10).expect("binding");

    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_A), Some(1));
    assert_eq!(lab.controller.lookup(other, vlan(10), &MAC_A), None);

    assert!(lab.controller.disconnect_switch(other));
    assert_eq!(lab.controller.switch_ids(), vec![SW]);
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_A), Some(1));
}

#[test]
fn test_remove_port_purges_learned_and_rules() {
    let mut lab = Lab::new(Duration::from_secs(30));
    lab.connect(&[(1, 10), (2, 10), (3, 10)]);
    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));
    lab.send(2, &frame(MAC_B, MAC_A, None), lab.at(0));

    lab.controller
        .remove_port(&mut lab.plane, SW, 1)
        .expect("port exists");
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_A), None);
    assert_eq!(lab.plane.flow_count(SW), 0);

    lab.drain_egress();
    lab.send(2, &frame(MAC_B, MacAddr::BROADCAST, None), lab.at(1));
    assert_eq!(lab.drain_egress(), vec![3]);

    lab.controller.add_port(SW, 1).expect("switch connected");
    assert_eq!(lab.controller.get_vlan_id(SW, 1), None);
}

#[test]
fn test_rebind_after_learning_keeps_vlan_boundary() {
    let mut lab = Lab::new(Duration::from_secs(30));
    lab.connect(&[(1, 10), (2, 10), (3, 20)]);
    let flow = FlowMatch {
        vlan: vlan(10),
        dst_mac: MAC_A,
    };

    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(0));
    lab.send(2, &frame(MAC_B, MAC_A, None), lab.at(0));
    assert_eq!(lab.plane.installed_rule(SW, &flow).map(|r| r.out_port), Some(1));

    // Port 1 moves to vlan 20: what was learned there belongs to vlan 10
    lab.set_vlan_id(SW, 1, 20).expect("valid binding");
    assert_eq!(lab.controller.lookup(SW, vlan(10), &MAC_A), None);
    assert_eq!(lab.plane.installed_rule(SW, &flow), None);

    lab.drain_egress();
    let decision = lab.send(2, &frame(MAC_B, MAC_A, None), lab.at(1));
    assert_eq!(
        decision,
        Decision::Flood {
            vlan: vlan(10),
            ports: vec![],
            reason: FloodReason::UnknownDestination,
        }
    );
    assert!(lab.drain_egress().is_empty());
    assert_eq!(lab.plane.flow_count(SW), 0);

    // A relearned in vlan 20 is reachable only from vlan 20
    lab.send(1, &frame(MAC_A, MacAddr::BROADCAST, None), lab.at(2));
    assert_eq!(lab.controller.lookup(SW, vlan(20), &MAC_A), Some(1));
    assert!(matches!(
        lab.send(3, &frame(MAC_C, MAC_A, None), lab.at(3)),
        Decision::Forward { port: 1, .. }
    ));
}
