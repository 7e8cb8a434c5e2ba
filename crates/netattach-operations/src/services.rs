use std::sync::Arc;

use netattach_exclusion::{ResourceGuard, ResourceRegistry};
use tracing::debug;

use crate::config::Config;
use crate::error::{OperationError, Result};
use crate::retry::{RetryPolicy, retry};
use crate::traits::{BridgeProvider, KvStore, NetworkController};

/// The external systems a workflow talks to, plus the settings and the
/// exclusion registry shared by every workflow of the process.
#[derive(Clone)]
pub struct NetworkServices {
    bridge: Arc<dyn BridgeProvider>,
    store: Arc<dyn KvStore>,
    controller: Arc<dyn NetworkController>,
    locks: Arc<ResourceRegistry>,
    config: Arc<Config>,
}

impl NetworkServices {
    /// Wires up the collaborators with the process-wide exclusion registry.
    #[must_use]
    pub fn new(
        bridge: Arc<dyn BridgeProvider>,
        store: Arc<dyn KvStore>,
        controller: Arc<dyn NetworkController>,
        config: Config,
    ) -> Self {
        Self {
            bridge,
            store,
            controller,
            locks: ResourceRegistry::global(),
            config: Arc::new(config),
        }
    }

    /// Uses one backend for all three collaborators.
    #[must_use]
    pub fn from_backend<B>(backend: Arc<B>, config: Config) -> Self
    where
        B: BridgeProvider + KvStore + NetworkController + 'static,
    {
        Self::new(backend.clone(), backend.clone(), backend, config)
    }

    /// Replaces the exclusion registry, e.g. to isolate tests.
    #[must_use]
    pub fn with_registry(mut self, locks: Arc<ResourceRegistry>) -> Self {
        self.locks = locks;
        self
    }

    #[must_use]
    pub fn bridge(&self) -> &dyn BridgeProvider {
        self.bridge.as_ref()
    }

    #[must_use]
    pub fn store(&self) -> &dyn KvStore {
        self.store.as_ref()
    }

    #[must_use]
    pub fn controller(&self) -> &dyn NetworkController {
        self.controller.as_ref()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn locks(&self) -> &ResourceRegistry {
        &self.locks
    }

    /// Runs an external call under the configured retry policy.
    ///
    /// # Errors
    ///
    /// Returns the last error once retries are exhausted.
    pub fn call<T>(&self, operation: &str, f: impl FnMut() -> Result<T>) -> Result<T> {
        retry(RetryPolicy::from_config(&self.config), operation, f)
    }

    /// Takes the exclusion token of `network`, waiting at most the
    /// configured lock timeout.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Exclusion`] if the wait timed out.
    pub fn lock_network(&self, network: &str) -> Result<ResourceGuard> {
        let key = network_lock_key(network);
        debug!(network, "acquiring network lock");
        match self.config.lock_timeout() {
            Some(timeout) => {
                self.locks
                    .acquire_timeout(&key, timeout)
                    .map_err(|source| OperationError::Exclusion {
                        network: network.to_string(),
                        source,
                    })
            }
            None => Ok(self.locks.acquire(&key)),
        }
    }
}

/// Registry key guarding decisions about one tenant network.
#[must_use]
pub fn network_lock_key(network: &str) -> String {
    format!("network/{network}")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::providers::LocalBackend;

    fn services(config: Config) -> NetworkServices {
        NetworkServices::from_backend(Arc::new(LocalBackend::new()), config)
            .with_registry(Arc::new(ResourceRegistry::new()))
    }

    #[test]
    fn from_backend_shares_one_backend() -> anyhow::Result<()> {
        let backend = Arc::new(LocalBackend::new());
        let services = NetworkServices::from_backend(Arc::clone(&backend), Config::default());

        let network_id = services.controller().create_network("blue", "acme", 100)?;
        services.bridge().add_port("br-int", "tap0", 100)?;
        let vlan = services.store().reserve_vlan(services.config().vlan_range)?;

        let state = backend.snapshot();
        assert!(state.controller_networks.contains_key(&network_id));
        assert_eq!(state.bridges["br-int"].ports["tap0"], 100);
        assert!(state.reserved_vlans.contains(&vlan));
        Ok(())
    }

    #[test]
    fn lock_network_uses_prefixed_key() -> anyhow::Result<()> {
        let services = services(Config::default());

        let guard = services.lock_network("blue")?;

        assert_eq!(guard.key(), "network/blue");
        assert!(services.locks().is_held("network/blue"));
        Ok(())
    }

    #[test]
    fn lock_network_times_out_when_configured() -> anyhow::Result<()> {
        let services = services(Config {
            lock_timeout_ms: Some(10),
            ..Config::default()
        });
        let _held = services.lock_network("blue")?;

        let result = services.lock_network("blue");

        assert!(matches!(
            result,
            Err(OperationError::Exclusion { ref network, .. }) if network == "blue"
        ));
        Ok(())
    }

    #[test]
    fn clones_share_the_registry() -> anyhow::Result<()> {
        let services = services(Config::default());
        let clone = services.clone();

        let _guard = services.lock_network("blue")?;

        assert!(
            clone
                .locks()
                .acquire_timeout("network/blue", Duration::from_millis(10))
                .is_err()
        );
        Ok(())
    }
}
