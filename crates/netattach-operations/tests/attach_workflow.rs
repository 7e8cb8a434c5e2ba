mod common;

use common::{Fixture, assert_clean, attach_request, pod, test_config};
use netattach_operations::operations::AttachData;
use netattach_operations::operations::attach::attach_workflow;
use netattach_operations::types::{AttachRequest, InterfaceRequest};
use netattach_operations::{Config, OperationError, attach, config::VlanRange};
use netattach_saga::{Outcome, StepContext, StepStatus};

#[test]
fn attach_provisions_network_and_every_interface() -> anyhow::Result<()> {
    let fx = Fixture::new();

    let outcome = attach(&fx.services, attach_request("web-0", "blue", &["eth0", "eth1"]))?;

    assert_eq!(outcome, Outcome::Completed);
    let state = fx.state();
    let network = &state.networks["blue"];
    assert_eq!(network.users, vec!["default/web-0".to_string()]);
    assert_eq!(state.reserved_vlans.iter().copied().collect::<Vec<_>>(), vec![100]);
    assert_eq!(state.controller_networks.len(), 1);
    assert!(state.controller_networks.contains_key(&network.controller_id));
    assert_eq!(state.controller_ports.len(), 2);
    assert_eq!(state.ports.len(), 2);

    let bridge = &state.bridges["br-int"];
    assert_eq!(bridge.ports.len(), 2);
    assert!(bridge.ports.values().all(|vlan| *vlan == 100));
    assert_eq!(bridge.flows.len(), 4);
    for record in state.ports.values() {
        assert!(bridge.ports.contains_key(&record.bridge_port));
        assert!(state.controller_ports.contains_key(&record.port_id));
    }
    assert!(!fx.network_locked("blue"));
    Ok(())
}

#[test]
fn attach_without_interfaces_stops() -> anyhow::Result<()> {
    let fx = Fixture::new();

    let outcome = attach(&fx.services, attach_request("web-0", "blue", &[]))?;

    assert_eq!(outcome, Outcome::Stopped);
    assert_clean(&fx.state());
    Ok(())
}

#[test]
fn attaching_twice_stops_without_changes() -> anyhow::Result<()> {
    let fx = Fixture::new();
    attach(&fx.services, attach_request("web-0", "blue", &["eth0"]))?;
    let before = fx.state();

    let outcome = attach(&fx.services, attach_request("web-0", "blue", &["eth0"]))?;

    assert_eq!(outcome, Outcome::Stopped);
    assert_eq!(fx.state(), before);
    assert!(!fx.network_locked("blue"));
    Ok(())
}

#[test]
fn second_pod_joins_existing_network() -> anyhow::Result<()> {
    let fx = Fixture::new();

    attach(&fx.services, attach_request("web-0", "blue", &["eth0"]))?;
    attach(&fx.services, attach_request("web-1", "blue", &["eth0"]))?;

    let state = fx.state();
    assert_eq!(state.controller_networks.len(), 1);
    assert_eq!(state.reserved_vlans.len(), 1);
    assert_eq!(state.networks["blue"].user_count(), 2);
    assert_eq!(fx.backend.call_count("create_network"), 1);
    Ok(())
}

#[test]
fn partially_attached_pod_only_gets_missing_interfaces() -> anyhow::Result<()> {
    let fx = Fixture::new();
    attach(&fx.services, attach_request("web-0", "blue", &["eth0"]))?;
    let eth0 = fx.state().ports["default/web-0/eth0"].clone();

    let outcome = attach(&fx.services, attach_request("web-0", "blue", &["eth0", "eth1"]))?;

    assert_eq!(outcome, Outcome::Completed);
    let state = fx.state();
    assert_eq!(state.ports["default/web-0/eth0"], eth0);
    assert!(state.ports.contains_key("default/web-0/eth1"));
    assert_eq!(state.controller_ports.len(), 2);
    assert_eq!(state.networks["blue"].user_count(), 1);
    Ok(())
}

#[test]
fn skipped_interfaces_show_in_audit_log() -> anyhow::Result<()> {
    let fx = Fixture::new();
    attach(&fx.services, attach_request("web-0", "blue", &["eth0"]))?;
    let mut workflow = attach_workflow(&fx.services);
    let mut ctx = StepContext::new(AttachData::new(attach_request(
        "web-0",
        "blue",
        &["eth0", "eth1"],
    )));

    let outcome = workflow.run(&mut ctx)?;

    assert_eq!(outcome, Outcome::Completed);
    let skipped: Vec<_> = ctx
        .audit()
        .with_status(StepStatus::Skipped)
        .map(|record| (record.name.as_str(), record.repeat_index))
        .collect();
    assert_eq!(
        skipped,
        vec![("attach_interface", Some(0)), ("create_logical_port", Some(0))]
    );
    assert!(
        ctx.audit()
            .with_status(StepStatus::Bypassed)
            .any(|record| record.name == "create_network")
    );
    Ok(())
}

#[test]
fn failure_on_later_interface_rolls_back_everything() {
    let fx = Fixture::new();
    fx.backend.fail_after("put_port_record", 1);

    let result = attach(&fx.services, attach_request("web-0", "blue", &["eth0", "eth1"]));

    assert!(matches!(
        result,
        Err(OperationError::Unavailable {
            operation: "put_port_record",
            ..
        })
    ));
    assert_clean(&fx.state());
    assert!(!fx.network_locked("blue"));
}

#[test]
fn failed_flow_write_cleans_up_its_own_flows() {
    let fx = Fixture::new();
    fx.backend.fail_after("add_flow", 1);

    let result = attach(&fx.services, attach_request("web-0", "blue", &["eth0"]));

    assert!(result.is_err());
    assert_clean(&fx.state());
    assert!(fx.backend.call_count("remove_flows") >= 1);
}

#[test]
fn failure_to_register_user_tears_down_new_network() {
    let fx = Fixture::new();
    fx.backend.fail("add_network_user");

    let result = attach(&fx.services, attach_request("web-0", "blue", &["eth0", "eth1"]));

    assert!(result.is_err());
    assert_clean(&fx.state());
}

#[test]
fn failure_after_joining_keeps_existing_network() -> anyhow::Result<()> {
    let fx = Fixture::new();
    attach(&fx.services, attach_request("web-0", "blue", &["eth0"]))?;
    let before = fx.state();
    fx.backend.fail("add_port");

    let result = attach(&fx.services, attach_request("web-1", "blue", &["eth0"]));

    assert!(result.is_err());
    let after = fx.state();
    assert_eq!(after.networks, before.networks);
    assert_eq!(after.controller_networks, before.controller_networks);
    assert_eq!(after.controller_ports, before.controller_ports);
    assert_eq!(after.reserved_vlans, before.reserved_vlans);
    Ok(())
}

#[test]
fn transient_failures_are_retried() -> anyhow::Result<()> {
    let fx = Fixture::new();
    fx.backend.fail_times("create_port", 2);

    let outcome = attach(&fx.services, attach_request("web-0", "blue", &["eth0"]))?;

    assert_eq!(outcome, Outcome::Completed);
    assert_eq!(fx.backend.call_count("create_port"), 3);
    Ok(())
}

#[test]
fn exhausted_retries_fail_the_attach() {
    let fx = Fixture::with_config(Config {
        retry_attempts: 2,
        ..test_config()
    });
    fx.backend.fail_times("create_port", 2);

    let result = attach(&fx.services, attach_request("web-0", "blue", &["eth0"]));

    assert!(result.is_err());
    assert_eq!(fx.backend.call_count("create_port"), 2);
    assert_clean(&fx.state());
}

#[test]
fn lookup_failure_is_reported_and_releases_lock() {
    let fx = Fixture::new();
    fx.backend.fail("network_record");

    let result = attach(&fx.services, attach_request("web-0", "blue", &["eth0"]));

    assert!(matches!(
        result,
        Err(OperationError::Unavailable {
            operation: "network_record",
            ..
        })
    ));
    assert_clean(&fx.state());
    assert!(!fx.network_locked("blue"));
}

#[test]
fn network_of_another_tenant_is_rejected() -> anyhow::Result<()> {
    let fx = Fixture::new();
    attach(&fx.services, attach_request("web-0", "blue", &["eth0"]))?;
    let request = AttachRequest {
        tenant: "globex".to_string(),
        ..attach_request("web-1", "blue", &["eth0"])
    };

    let result = attach(&fx.services, request);

    assert!(matches!(result, Err(OperationError::InvalidRequest(_))));
    assert_eq!(fx.state().networks["blue"].user_count(), 1);
    assert!(!fx.network_locked("blue"));
    Ok(())
}

#[test]
fn interface_attached_to_other_network_conflicts() -> anyhow::Result<()> {
    let fx = Fixture::new();
    attach(&fx.services, attach_request("web-0", "blue", &["eth0"]))?;

    let result = attach(&fx.services, attach_request("web-0", "green", &["eth0"]));

    assert!(matches!(result, Err(OperationError::AlreadyExists(_))));
    assert!(!fx.state().networks.contains_key("green"));
    Ok(())
}

#[test]
fn malformed_requests_are_rejected() {
    let fx = Fixture::new();
    let duplicate = attach_request("web-0", "blue", &["eth0", "eth0"]);
    let unnamed = AttachRequest {
        network: " ".to_string(),
        ..attach_request("web-0", "blue", &["eth0"])
    };

    for request in [duplicate, unnamed] {
        let result = attach(&fx.services, request);
        assert!(matches!(result, Err(OperationError::InvalidRequest(_))));
    }
    assert_clean(&fx.state());
}

#[test]
fn requested_mac_is_used() -> anyhow::Result<()> {
    let fx = Fixture::new();
    let request = AttachRequest {
        pod: pod("web-0"),
        network: "blue".to_string(),
        tenant: "acme".to_string(),
        interfaces: vec![InterfaceRequest::new("eth0").with_mac("02:42:ac:11:00:02")],
    };

    attach(&fx.services, request)?;

    let state = fx.state();
    let record = &state.ports["default/web-0/eth0"];
    assert_eq!(record.mac, "02:42:ac:11:00:02");
    assert!(
        state.bridges["br-int"]
            .flows
            .iter()
            .all(|flow| flow.mac == "02:42:ac:11:00:02")
    );
    Ok(())
}

#[test]
fn exhausted_vlan_range_fails_without_leftovers() -> anyhow::Result<()> {
    let fx = Fixture::with_config(Config {
        vlan_range: VlanRange::new(300, 300),
        ..test_config()
    });
    attach(&fx.services, attach_request("web-0", "blue", &["eth0"]))?;
    let before = fx.state();

    let result = attach(&fx.services, attach_request("db-0", "green", &["eth0"]));

    assert!(matches!(
        result,
        Err(OperationError::VlanExhausted { start: 300, end: 300 })
    ));
    assert_eq!(fx.state(), before);
    assert!(!fx.network_locked("green"));
    Ok(())
}
