use crate::Result;
use crate::types::LogicalPort;

/// IaaS network controller owning tenant networks and their logical ports.
pub trait NetworkController: Send + Sync {
    /// Creates a network and returns its controller ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller rejects the request or is unreachable.
    fn create_network(&self, name: &str, tenant: &str, vlan: u16) -> Result<String>;

    /// Deletes a network. Deleting an unknown network succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is unreachable or the network still has ports.
    fn delete_network(&self, network_id: &str) -> Result<()>;

    /// Creates a port on `network_id`, assigning a MAC address when none is given.
    ///
    /// # Errors
    ///
    /// Returns an error if the network does not exist or the MAC is taken.
    fn create_port(&self, network_id: &str, mac: Option<&str>) -> Result<LogicalPort>;

    /// Deletes a port. Deleting an unknown port succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the controller is unreachable.
    fn delete_port(&self, port_id: &str) -> Result<()>;
}
