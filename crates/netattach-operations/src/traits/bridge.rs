use crate::Result;
use crate::types::FlowRule;

/// Software bridge the pod ports are plugged into.
pub trait BridgeProvider: Send + Sync {
    /// Adds `port` to `bridge` as an access port tagged with `vlan`.
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge is unreachable or the port already exists.
    fn add_port(&self, bridge: &str, port: &str, vlan: u16) -> Result<()>;

    /// Removes `port` from `bridge`. Removing an absent port succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge is unreachable.
    fn remove_port(&self, bridge: &str, port: &str) -> Result<()>;

    /// # Errors
    ///
    /// Returns an error if the flow cannot be written.
    fn add_flow(&self, rule: &FlowRule) -> Result<()>;

    /// Removes every flow on `bridge` carrying `cookie`. Returns how many
    /// were removed; zero is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the bridge is unreachable.
    fn remove_flows(&self, bridge: &str, cookie: u64) -> Result<usize>;
}
