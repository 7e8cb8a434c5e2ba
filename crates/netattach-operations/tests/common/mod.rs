#![allow(dead_code)]

use std::sync::Arc;

use netattach_exclusion::ResourceRegistry;
use netattach_operations::providers::{ClusterState, FaultyBackend, LocalBackend};
use netattach_operations::types::{AttachRequest, DetachRequest, InterfaceRequest, PodRef};
use netattach_operations::{Config, NetworkServices};

pub struct Fixture {
    pub backend: Arc<FaultyBackend>,
    pub registry: Arc<ResourceRegistry>,
    pub services: NetworkServices,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        Self::with_backend(Arc::new(LocalBackend::new()), config)
    }

    pub fn with_backend(local: Arc<LocalBackend>, config: Config) -> Self {
        let backend = Arc::new(FaultyBackend::new(local));
        let registry = Arc::new(ResourceRegistry::new());
        let services = NetworkServices::from_backend(Arc::clone(&backend), config)
            .with_registry(Arc::clone(&registry));
        Self {
            backend,
            registry,
            services,
        }
    }

    pub fn state(&self) -> ClusterState {
        self.backend.inner().snapshot()
    }

    pub fn network_locked(&self, network: &str) -> bool {
        self.registry
            .is_held(&netattach_operations::network_lock_key(network))
    }
}

pub fn test_config() -> Config {
    Config {
        retry_attempts: 3,
        retry_delay_ms: 0,
        ..Config::default()
    }
}

pub fn pod(name: &str) -> PodRef {
    PodRef::new("default", name)
}

pub fn attach_request(pod_name: &str, network: &str, interfaces: &[&str]) -> AttachRequest {
    AttachRequest {
        pod: pod(pod_name),
        network: network.to_string(),
        tenant: "acme".to_string(),
        interfaces: interfaces
            .iter()
            .map(|name| InterfaceRequest::new(*name))
            .collect(),
    }
}

pub fn detach_request(pod_name: &str, network: &str) -> DetachRequest {
    DetachRequest {
        pod: pod(pod_name),
        network: network.to_string(),
    }
}

/// Asserts that nothing provisioned by a workflow is left behind.
pub fn assert_clean(state: &ClusterState) {
    assert!(state.networks.is_empty(), "network records left: {:?}", state.networks);
    assert!(state.ports.is_empty(), "port records left: {:?}", state.ports);
    assert!(state.reserved_vlans.is_empty(), "VLANs left: {:?}", state.reserved_vlans);
    assert!(
        state.controller_networks.is_empty(),
        "controller networks left: {:?}",
        state.controller_networks
    );
    assert!(
        state.controller_ports.is_empty(),
        "controller ports left: {:?}",
        state.controller_ports
    );
    for (name, bridge) in &state.bridges {
        assert!(bridge.ports.is_empty(), "ports left on {name}: {:?}", bridge.ports);
        assert!(bridge.flows.is_empty(), "flows left on {name}: {:?}", bridge.flows);
    }
}
