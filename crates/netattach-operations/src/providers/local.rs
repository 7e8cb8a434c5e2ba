use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::VlanRange;
use crate::error::{OperationError, Result};
use crate::traits::{BridgeProvider, KvStore, NetworkController};
use crate::types::{FlowRule, LogicalPort, PodRef, PortRecord, TenantNetwork, port_key};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeState {
    /// Port name to VLAN tag.
    pub ports: IndexMap<String, u16>,
    pub flows: Vec<FlowRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerNetwork {
    pub id: String,
    pub name: String,
    pub tenant: String,
    pub vlan: u16,
}

/// Everything the local backend knows, as written to the state file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterState {
    pub next_id: u64,
    pub reserved_vlans: BTreeSet<u16>,
    pub bridges: IndexMap<String, BridgeState>,
    pub networks: IndexMap<String, TenantNetwork>,
    pub ports: IndexMap<String, PortRecord>,
    pub controller_networks: IndexMap<String, ControllerNetwork>,
    pub controller_ports: IndexMap<String, LogicalPort>,
}

impl ClusterState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:08x}", self.next_id)
    }

    #[must_use]
    pub fn bridge(&self, name: &str) -> Option<&BridgeState> {
        self.bridges.get(name)
    }
}

/// Reads a state file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_state(path: &Path) -> Result<ClusterState> {
    let content = fs::read_to_string(path).map_err(|source| OperationError::StateRead {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| OperationError::StateParse {
        path: path.to_path_buf(),
        source,
    })
}

/// Writes a state file through a sibling temporary file, so readers never
/// observe a partial write.
///
/// # Errors
///
/// Returns an error if the state cannot be serialized or written.
pub fn save_state(path: &Path, state: &ClusterState) -> Result<()> {
    let content = toml::to_string(state).map_err(|source| OperationError::StateSerialize {
        path: path.to_path_buf(),
        source,
    })?;
    let write_err = |source| OperationError::StateWrite {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let tmp = path.with_extension("toml.tmp");
    fs::write(&tmp, content).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)
}

/// Bridge, key-value store and controller emulated over one in-process
/// [`ClusterState`].
///
/// With a state file every mutation is written through before it becomes
/// visible, so a failed write leaves both the file and the in-memory state
/// unchanged. The file is not locked against other processes.
#[derive(Debug, Default)]
pub struct LocalBackend {
    state: Mutex<ClusterState>,
    state_file: Option<PathBuf>,
}

impl LocalBackend {
    /// An empty in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_state(state: ClusterState) -> Self {
        Self {
            state: Mutex::new(state),
            state_file: None,
        }
    }

    /// Opens a backend persisted at `path`, starting empty if the file does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be read or parsed.
    pub fn open(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            load_state(path)?
        } else {
            ClusterState::default()
        };
        debug!(path = %path.display(), networks = state.networks.len(), "opened state file");
        Ok(Self {
            state: Mutex::new(state),
            state_file: Some(path.to_path_buf()),
        })
    }

    #[must_use]
    pub fn state_file(&self) -> Option<&Path> {
        self.state_file.as_deref()
    }

    #[must_use]
    pub fn snapshot(&self) -> ClusterState {
        self.lock().clone()
    }

    // Mutations go through a copy, so the guarded state is never left
    // half-updated and a poisoned lock still holds a consistent value.
    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read<T>(&self, f: impl FnOnce(&ClusterState) -> T) -> T {
        f(&self.lock())
    }

    fn update<T>(&self, f: impl FnOnce(&mut ClusterState) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        let mut next = guard.clone();
        let value = f(&mut next)?;
        if let Some(path) = &self.state_file {
            save_state(path, &next)?;
        }
        *guard = next;
        Ok(value)
    }
}

impl BridgeProvider for LocalBackend {
    fn add_port(&self, bridge: &str, port: &str, vlan: u16) -> Result<()> {
        self.update(|state| {
            let ports = &mut state.bridges.entry(bridge.to_string()).or_default().ports;
            if ports.contains_key(port) {
                return Err(OperationError::AlreadyExists(format!(
                    "port {port} on bridge {bridge}"
                )));
            }
            ports.insert(port.to_string(), vlan);
            Ok(())
        })
    }

    fn remove_port(&self, bridge: &str, port: &str) -> Result<()> {
        self.update(|state| {
            if let Some(bridge) = state.bridges.get_mut(bridge) {
                bridge.ports.shift_remove(port);
            }
            Ok(())
        })
    }

    fn add_flow(&self, rule: &FlowRule) -> Result<()> {
        self.update(|state| {
            let bridge = state.bridges.entry(rule.bridge.clone()).or_default();
            if !bridge.flows.contains(rule) {
                bridge.flows.push(rule.clone());
            }
            Ok(())
        })
    }

    fn remove_flows(&self, bridge: &str, cookie: u64) -> Result<usize> {
        self.update(|state| {
            let Some(bridge) = state.bridges.get_mut(bridge) else {
                return Ok(0);
            };
            let before = bridge.flows.len();
            bridge.flows.retain(|flow| flow.cookie != cookie);
            Ok(before - bridge.flows.len())
        })
    }
}

impl KvStore for LocalBackend {
    fn network_record(&self, name: &str) -> Result<Option<TenantNetwork>> {
        Ok(self.read(|state| state.networks.get(name).cloned()))
    }

    fn put_network_record(&self, network: &TenantNetwork) -> Result<()> {
        self.update(|state| {
            if state.networks.contains_key(&network.name) {
                return Err(OperationError::AlreadyExists(format!(
                    "network record {}",
                    network.name
                )));
            }
            state
                .networks
                .insert(network.name.clone(), network.clone());
            Ok(())
        })
    }

    fn delete_network_record(&self, name: &str) -> Result<()> {
        self.update(|state| {
            state.networks.shift_remove(name);
            Ok(())
        })
    }

    fn add_network_user(&self, name: &str, user: &str) -> Result<usize> {
        self.update(|state| {
            let network = state
                .networks
                .get_mut(name)
                .ok_or_else(|| OperationError::NotFound(format!("network record {name}")))?;
            if !network.users.iter().any(|u| u == user) {
                network.users.push(user.to_string());
            }
            Ok(network.user_count())
        })
    }

    fn remove_network_user(&self, name: &str, user: &str) -> Result<usize> {
        self.update(|state| {
            let Some(network) = state.networks.get_mut(name) else {
                return Ok(0);
            };
            network.users.retain(|u| u != user);
            Ok(network.user_count())
        })
    }

    fn port_record(&self, pod: &PodRef, interface: &str) -> Result<Option<PortRecord>> {
        Ok(self.read(|state| state.ports.get(&port_key(pod, interface)).cloned()))
    }

    fn port_records(&self, pod: &PodRef) -> Result<Vec<PortRecord>> {
        Ok(self.read(|state| {
            state
                .ports
                .values()
                .filter(|record| &record.pod == pod)
                .cloned()
                .collect()
        }))
    }

    fn put_port_record(&self, record: &PortRecord) -> Result<()> {
        self.update(|state| {
            let key = record.key();
            if state.ports.contains_key(&key) {
                return Err(OperationError::AlreadyExists(format!("port record {key}")));
            }
            state.ports.insert(key, record.clone());
            Ok(())
        })
    }

    fn delete_port_record(&self, pod: &PodRef, interface: &str) -> Result<()> {
        self.update(|state| {
            state.ports.shift_remove(&port_key(pod, interface));
            Ok(())
        })
    }

    fn reserve_vlan(&self, range: VlanRange) -> Result<u16> {
        self.update(|state| {
            let vlan = range
                .iter()
                .find(|vlan| !state.reserved_vlans.contains(vlan))
                .ok_or(OperationError::VlanExhausted {
                    start: range.start,
                    end: range.end,
                })?;
            state.reserved_vlans.insert(vlan);
            Ok(vlan)
        })
    }

    fn release_vlan(&self, vlan: u16) -> Result<()> {
        self.update(|state| {
            state.reserved_vlans.remove(&vlan);
            Ok(())
        })
    }
}

impl NetworkController for LocalBackend {
    fn create_network(&self, name: &str, tenant: &str, vlan: u16) -> Result<String> {
        self.update(|state| {
            if state
                .controller_networks
                .values()
                .any(|network| network.name == name && network.tenant == tenant)
            {
                return Err(OperationError::AlreadyExists(format!(
                    "controller network {name} of tenant {tenant}"
                )));
            }
            let id = state.next_id("net");
            state.controller_networks.insert(
                id.clone(),
                ControllerNetwork {
                    id: id.clone(),
                    name: name.to_string(),
                    tenant: tenant.to_string(),
                    vlan,
                },
            );
            Ok(id)
        })
    }

    fn delete_network(&self, network_id: &str) -> Result<()> {
        self.update(|state| {
            if state
                .controller_ports
                .values()
                .any(|port| port.network_id == network_id)
            {
                return Err(OperationError::InUse(format!(
                    "controller network {network_id}"
                )));
            }
            state.controller_networks.shift_remove(network_id);
            Ok(())
        })
    }

    fn create_port(&self, network_id: &str, mac: Option<&str>) -> Result<LogicalPort> {
        self.update(|state| {
            if !state.controller_networks.contains_key(network_id) {
                return Err(OperationError::NotFound(format!(
                    "controller network {network_id}"
                )));
            }
            let id = state.next_id("port");
            let mac = match mac {
                Some(mac) => mac.to_string(),
                None => generated_mac(state.next_id),
            };
            if state
                .controller_ports
                .values()
                .any(|port| port.network_id == network_id && port.mac == mac)
            {
                return Err(OperationError::AlreadyExists(format!(
                    "MAC {mac} on network {network_id}"
                )));
            }
            let port = LogicalPort {
                id: id.clone(),
                network_id: network_id.to_string(),
                mac,
            };
            state.controller_ports.insert(id, port.clone());
            Ok(port)
        })
    }

    fn delete_port(&self, port_id: &str) -> Result<()> {
        self.update(|state| {
            state.controller_ports.shift_remove(port_id);
            Ok(())
        })
    }
}

/// Locally administered unicast MAC derived from a counter.
fn generated_mac(seed: u64) -> String {
    let bytes = seed.to_be_bytes();
    format!(
        "02:00:{:02x}:{:02x}:{:02x}:{:02x}",
        bytes[4], bytes[5], bytes[6], bytes[7]
    )
}
