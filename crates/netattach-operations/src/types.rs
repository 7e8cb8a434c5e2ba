use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies the container a request is for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PodRef {
    pub namespace: String,
    pub name: String,
}

impl PodRef {
    #[must_use]
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for PodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceRequest {
    pub name: String,
    /// Requested MAC address. The controller assigns one when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mac: Option<String>,
}

impl InterfaceRequest {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mac: None,
        }
    }

    #[must_use]
    pub fn with_mac(mut self, mac: impl Into<String>) -> Self {
        self.mac = Some(mac.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachRequest {
    pub pod: PodRef,
    pub network: String,
    pub tenant: String,
    pub interfaces: Vec<InterfaceRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetachRequest {
    pub pod: PodRef,
    pub network: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FlowDirection {
    Ingress,
    Egress,
}

/// A bridge flow-table entry. Entries written for one port share a cookie
/// so they can be removed together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowRule {
    pub bridge: String,
    pub cookie: u64,
    pub port: String,
    pub vlan: u16,
    pub mac: String,
    pub direction: FlowDirection,
}

/// Key-value record of a tenant network shared by every pod attached to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantNetwork {
    pub name: String,
    pub tenant: String,
    pub vlan: u16,
    pub controller_id: String,
    /// Pods currently attached, as `namespace/name`.
    #[serde(default)]
    pub users: Vec<String>,
}

impl TenantNetwork {
    #[must_use]
    pub fn user_count(&self) -> usize {
        self.users.len()
    }
}

/// Port created by the network controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicalPort {
    pub id: String,
    pub network_id: String,
    pub mac: String,
}

/// Key-value record of one attached interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRecord {
    pub pod: PodRef,
    pub interface: String,
    pub network: String,
    pub port_id: String,
    pub bridge: String,
    pub bridge_port: String,
    pub vlan: u16,
    pub mac: String,
    pub flow_cookie: u64,
}

impl PortRecord {
    /// Store key, unique per pod and interface.
    #[must_use]
    pub fn key(&self) -> String {
        port_key(&self.pod, &self.interface)
    }

    /// Rebuilds the flow entries written for this port.
    #[must_use]
    pub fn flows(&self) -> [FlowRule; 2] {
        [FlowDirection::Ingress, FlowDirection::Egress].map(|direction| FlowRule {
            bridge: self.bridge.clone(),
            cookie: self.flow_cookie,
            port: self.bridge_port.clone(),
            vlan: self.vlan,
            mac: self.mac.clone(),
            direction,
        })
    }
}

#[must_use]
pub fn port_key(pod: &PodRef, interface: &str) -> String {
    format!("{pod}/{interface}")
}

/// Bridge port name for a logical port, kept within the 15 byte limit of
/// Linux interface names. IDs usually share a prefix, so the tail is kept.
#[must_use]
pub fn bridge_port_name(port_id: &str) -> String {
    let chars: Vec<char> = port_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    let suffix: String = chars[chars.len().saturating_sub(12)..].iter().collect();
    format!("na-{suffix}")
}

/// Flow cookie for a logical port. FNV-1a, truncated to 48 bits so it
/// survives a round trip through signed 64-bit storage.
#[must_use]
pub fn flow_cookie(port_id: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let hash = port_id
        .bytes()
        .fold(OFFSET, |hash, byte| (hash ^ u64::from(byte)).wrapping_mul(PRIME));
    hash & 0x0000_ffff_ffff_ffff
}
