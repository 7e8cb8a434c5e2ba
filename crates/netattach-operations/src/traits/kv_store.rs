use crate::Result;
use crate::config::VlanRange;
use crate::types::{PodRef, PortRecord, TenantNetwork};

/// Persistent records of tenant networks, attached ports and VLAN
/// reservations.
pub trait KvStore: Send + Sync {
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn network_record(&self, name: &str) -> Result<Option<TenantNetwork>>;

    /// # Errors
    ///
    /// Returns an error if a record with the same name already exists.
    fn put_network_record(&self, network: &TenantNetwork) -> Result<()>;

    /// Deletes a network record. Deleting an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn delete_network_record(&self, name: &str) -> Result<()>;

    /// Adds `user` to the network's users and returns the new count. Adding
    /// an existing user leaves the record unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the network record does not exist.
    fn add_network_user(&self, name: &str, user: &str) -> Result<usize>;

    /// Removes `user` from the network's users and returns the remaining
    /// count. Removing an absent user, or from an absent network, succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn remove_network_user(&self, name: &str, user: &str) -> Result<usize>;

    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn port_record(&self, pod: &PodRef, interface: &str) -> Result<Option<PortRecord>>;

    /// Every port record of `pod`, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn port_records(&self, pod: &PodRef) -> Result<Vec<PortRecord>>;

    /// # Errors
    ///
    /// Returns an error if a record for the same pod and interface exists.
    fn put_port_record(&self, record: &PortRecord) -> Result<()>;

    /// Deletes a port record. Deleting an absent record succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn delete_port_record(&self, pod: &PodRef, interface: &str) -> Result<()>;

    /// Reserves the lowest free VLAN in `range`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::VlanExhausted`](crate::OperationError::VlanExhausted)
    /// if every VLAN in the range is taken.
    fn reserve_vlan(&self, range: VlanRange) -> Result<u16>;

    /// Returns a VLAN to the pool. Releasing a free VLAN succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn release_vlan(&self, vlan: u16) -> Result<()>;
}
