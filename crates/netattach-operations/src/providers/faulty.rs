use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::config::VlanRange;
use crate::error::{OperationError, Result};
use crate::providers::LocalBackend;
use crate::traits::{BridgeProvider, KvStore, NetworkController};
use crate::types::{FlowRule, LogicalPort, PodRef, PortRecord, TenantNetwork};

#[derive(Debug, Clone, Copy)]
struct Fault {
    /// Calls that still succeed before the fault kicks in.
    pass: usize,
    /// Calls that fail once it does. `None` fails forever.
    fail: Option<usize>,
}

/// Wraps a [`LocalBackend`] and fails named operations on demand.
///
/// Operation names are the trait method names, e.g. `"add_flow"` or
/// `"create_port"`. Injected failures are [`OperationError::Unavailable`],
/// so they are retried like real outages. Every call is recorded.
#[derive(Debug)]
pub struct FaultyBackend {
    inner: Arc<LocalBackend>,
    faults: Mutex<HashMap<&'static str, Fault>>,
    calls: Mutex<Vec<&'static str>>,
}

impl FaultyBackend {
    #[must_use]
    pub fn new(inner: Arc<LocalBackend>) -> Self {
        Self {
            inner,
            faults: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn inner(&self) -> &Arc<LocalBackend> {
        &self.inner
    }

    /// Fails every call of `operation`.
    pub fn fail(&self, operation: &'static str) {
        self.set(operation, Fault { pass: 0, fail: None });
    }

    /// Fails the next `times` calls of `operation`, then recovers.
    pub fn fail_times(&self, operation: &'static str, times: usize) {
        self.set(
            operation,
            Fault {
                pass: 0,
                fail: Some(times),
            },
        );
    }

    /// Lets `calls` calls of `operation` through, then fails every call.
    pub fn fail_after(&self, operation: &'static str, calls: usize) {
        self.set(
            operation,
            Fault {
                pass: calls,
                fail: None,
            },
        );
    }

    pub fn heal(&self, operation: &'static str) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(operation);
    }

    /// Operations called so far, in order, failed ones included.
    #[must_use]
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|call| **call == operation)
            .count()
    }

    fn set(&self, operation: &'static str, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(operation, fault);
    }

    fn check(&self, system: &'static str, operation: &'static str) -> Result<()> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(operation);
        let mut faults = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(fault) = faults.get_mut(operation) else {
            return Ok(());
        };
        if fault.pass > 0 {
            fault.pass -= 1;
            return Ok(());
        }
        match &mut fault.fail {
            Some(0) => return Ok(()),
            Some(remaining) => *remaining -= 1,
            None => {}
        }
        Err(OperationError::Unavailable {
            system,
            operation,
            reason: "injected fault".to_string(),
        })
    }
}

impl BridgeProvider for FaultyBackend {
    fn add_port(&self, bridge: &str, port: &str, vlan: u16) -> Result<()> {
        self.check("bridge", "add_port")?;
        self.inner.add_port(bridge, port, vlan)
    }

    fn remove_port(&self, bridge: &str, port: &str) -> Result<()> {
        self.check("bridge", "remove_port")?;
        self.inner.remove_port(bridge, port)
    }

    fn add_flow(&self, rule: &FlowRule) -> Result<()> {
        self.check("bridge", "add_flow")?;
        self.inner.add_flow(rule)
    }

    fn remove_flows(&self, bridge: &str, cookie: u64) -> Result<usize> {
        self.check("bridge", "remove_flows")?;
        self.inner.remove_flows(bridge, cookie)
    }
}

impl KvStore for FaultyBackend {
    fn network_record(&self, name: &str) -> Result<Option<TenantNetwork>> {
        self.check("kv store", "network_record")?;
        self.inner.network_record(name)
    }

    fn put_network_record(&self, network: &TenantNetwork) -> Result<()> {
        self.check("kv store", "put_network_record")?;
        self.inner.put_network_record(network)
    }

    fn delete_network_record(&self, name: &str) -> Result<()> {
        self.check("kv store", "delete_network_record")?;
        self.inner.delete_network_record(name)
    }

    fn add_network_user(&self, name: &str, user: &str) -> Result<usize> {
        self.check("kv store", "add_network_user")?;
        self.inner.add_network_user(name, user)
    }

    fn remove_network_user(&self, name: &str, user: &str) -> Result<usize> {
        self.check("kv store", "remove_network_user")?;
        self.inner.remove_network_user(name, user)
    }

    fn port_record(&self, pod: &PodRef, interface: &str) -> Result<Option<PortRecord>> {
        self.check("kv store", "port_record")?;
        self.inner.port_record(pod, interface)
    }

    fn port_records(&self, pod: &PodRef) -> Result<Vec<PortRecord>> {
        self.check("kv store", "port_records")?;
        self.inner.port_records(pod)
    }

    fn put_port_record(&self, record: &PortRecord) -> Result<()> {
        self.check("kv store", "put_port_record")?;
        self.inner.put_port_record(record)
    }

    fn delete_port_record(&self, pod: &PodRef, interface: &str) -> Result<()> {
        self.check("kv store", "delete_port_record")?;
        self.inner.delete_port_record(pod, interface)
    }

    fn reserve_vlan(&self, range: VlanRange) -> Result<u16> {
        self.check("kv store", "reserve_vlan")?;
        self.inner.reserve_vlan(range)
    }

    fn release_vlan(&self, vlan: u16) -> Result<()> {
        self.check("kv store", "release_vlan")?;
        self.inner.release_vlan(vlan)
    }
}

impl NetworkController for FaultyBackend {
    fn create_network(&self, name: &str, tenant: &str, vlan: u16) -> Result<String> {
        self.check("controller", "create_network")?;
        self.inner.create_network(name, tenant, vlan)
    }

    fn delete_network(&self, network_id: &str) -> Result<()> {
        self.check("controller", "delete_network")?;
        self.inner.delete_network(network_id)
    }

    fn create_port(&self, network_id: &str, mac: Option<&str>) -> Result<LogicalPort> {
        self.check("controller", "create_port")?;
        self.inner.create_port(network_id, mac)
    }

    fn delete_port(&self, port_id: &str) -> Result<()> {
        self.check("controller", "delete_port")?;
        self.inner.delete_port(port_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> FaultyBackend {
        FaultyBackend::new(Arc::new(LocalBackend::new()))
    }

    #[test]
    fn healthy_operations_pass_through() -> anyhow::Result<()> {
        let faulty = backend();

        faulty.add_port("br-int", "na-1", 100)?;

        assert!(faulty.inner().snapshot().bridges["br-int"].ports.contains_key("na-1"));
        assert_eq!(faulty.calls(), vec!["add_port"]);
        Ok(())
    }

    #[test]
    fn fail_times_recovers() {
        let faulty = backend();
        faulty.fail_times("reserve_vlan", 2);
        let range = VlanRange::new(1, 5);

        assert!(faulty.reserve_vlan(range).is_err());
        assert!(faulty.reserve_vlan(range).is_err());
        assert!(faulty.reserve_vlan(range).is_ok());
        assert_eq!(faulty.call_count("reserve_vlan"), 3);
    }

    #[test]
    fn fail_after_lets_calls_through_first() -> anyhow::Result<()> {
        let faulty = backend();
        faulty.fail_after("release_vlan", 1);

        faulty.release_vlan(1)?;
        let err = faulty.release_vlan(1).err();

        assert!(matches!(
            err,
            Some(OperationError::Unavailable {
                system: "kv store",
                operation: "release_vlan",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn heal_clears_a_permanent_fault() {
        let faulty = backend();
        faulty.fail("remove_flows");
        assert!(faulty.remove_flows("br-int", 1).is_err());

        faulty.heal("remove_flows");

        assert!(faulty.remove_flows("br-int", 1).is_ok());
    }

    #[test]
    fn injected_faults_are_transient() {
        let faulty = backend();
        faulty.fail("create_network");

        let err = faulty.create_network("blue", "acme", 100).err();

        assert!(err.is_some_and(|e| e.is_transient()));
        assert!(faulty.inner().snapshot().controller_networks.is_empty());
    }
}
