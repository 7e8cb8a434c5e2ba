use netattach_saga::{Predicate, Step, StepContext, StepError};
use tracing::{debug, warn};

use super::DetachData;
use crate::OperationError;
use crate::config::VlanRange;
use crate::operations::{StepResult, best_effort};
use crate::services::NetworkServices;

pub(super) struct LoadAttachment {
    services: NetworkServices,
}

impl LoadAttachment {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<DetachData, OperationError> for LoadAttachment {
    fn name(&self) -> &'static str {
        "load_attachment"
    }

    fn execute(&mut self, ctx: &mut StepContext<DetachData>) -> StepResult {
        let data = ctx.payload_mut();
        if data.request.network.trim().is_empty() {
            return Err(OperationError::InvalidRequest("network name is empty".to_string()).into());
        }
        let store = self.services.store();
        let pod = &data.request.pod;
        let network = &data.request.network;

        let records: Vec<_> = self
            .services
            .call("port_records", || store.port_records(pod))?
            .into_iter()
            .filter(|record| &record.network == network)
            .collect();
        if records.is_empty() {
            debug!(%pod, %network, "pod has no ports on network");
            return Err(StepError::Stop);
        }
        let record = self
            .services
            .call("network_record", || store.network_record(network))?;
        if record.is_none() {
            warn!(%network, "network record missing, only removing ports");
        }

        let count = records.len();
        data.records = records;
        data.network = record;
        ctx.set_repeat_count(count);
        Ok(())
    }
}

pub(super) struct RemovePortFlows {
    services: NetworkServices,
}

impl RemovePortFlows {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<DetachData, OperationError> for RemovePortFlows {
    fn name(&self) -> &'static str {
        "remove_port_flows"
    }

    fn execute(&mut self, ctx: &mut StepContext<DetachData>) -> StepResult {
        let record = ctx.payload().record(ctx.repeat_index())?;
        let provider = self.services.bridge();
        let removed = self.services.call("remove_flows", || {
            provider.remove_flows(&record.bridge, record.flow_cookie)
        })?;
        debug!(port = %record.bridge_port, removed, "removed port flows");
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<DetachData>) {
        let Ok(record) = ctx.payload().record(ctx.repeat_index()) else {
            return;
        };
        let provider = self.services.bridge();
        for rule in record.flows() {
            best_effort(
                "add_flow",
                self.services.call("add_flow", || provider.add_flow(&rule)),
            );
        }
    }

    fn compensation_description(&self) -> String {
        "write the port's flows again".to_string()
    }
}

pub(super) struct RemoveBridgePort {
    services: NetworkServices,
}

impl RemoveBridgePort {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<DetachData, OperationError> for RemoveBridgePort {
    fn name(&self) -> &'static str {
        "remove_bridge_port"
    }

    fn execute(&mut self, ctx: &mut StepContext<DetachData>) -> StepResult {
        let record = ctx.payload().record(ctx.repeat_index())?;
        let provider = self.services.bridge();
        self.services.call("remove_port", || {
            provider.remove_port(&record.bridge, &record.bridge_port)
        })?;
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<DetachData>) {
        let Ok(record) = ctx.payload().record(ctx.repeat_index()) else {
            return;
        };
        let provider = self.services.bridge();
        best_effort(
            "add_port",
            self.services.call("add_port", || {
                provider.add_port(&record.bridge, &record.bridge_port, record.vlan)
            }),
        );
    }

    fn compensation_description(&self) -> String {
        "add the port to the bridge again".to_string()
    }
}

pub(super) struct DeleteLogicalPort {
    services: NetworkServices,
}

impl DeleteLogicalPort {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<DetachData, OperationError> for DeleteLogicalPort {
    fn name(&self) -> &'static str {
        "delete_logical_port"
    }

    fn execute(&mut self, ctx: &mut StepContext<DetachData>) -> StepResult {
        let record = ctx.payload().record(ctx.repeat_index())?;
        let controller = self.services.controller();
        self.services
            .call("delete_port", || controller.delete_port(&record.port_id))?;
        Ok(())
    }

    /// The controller hands out a new ID for the re-created port, so the
    /// stored record is rewritten to point at it.
    fn rollback(&mut self, ctx: &mut StepContext<DetachData>) {
        let index = ctx.repeat_index();
        let data = ctx.payload_mut();
        let Some(network_id) = data.network.as_ref().map(|n| n.controller_id.clone()) else {
            warn!("no controller network to re-create the logical port on");
            return;
        };
        let Some(record) = data.records.get_mut(index) else {
            return;
        };

        let controller = self.services.controller();
        let port = match self.services.call("create_port", || {
            controller.create_port(&network_id, Some(&record.mac))
        }) {
            Ok(port) => port,
            Err(err) => {
                best_effort::<()>("create_port", Err(err));
                return;
            }
        };
        record.port_id = port.id;

        let store = self.services.store();
        best_effort(
            "rewrite_port_record",
            self.services.call("rewrite_port_record", || {
                store.delete_port_record(&record.pod, &record.interface)?;
                store.put_port_record(record)
            }),
        );
    }

    fn compensation_description(&self) -> String {
        "re-create the logical port".to_string()
    }
}

pub(super) struct DeletePortRecord {
    services: NetworkServices,
}

impl DeletePortRecord {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<DetachData, OperationError> for DeletePortRecord {
    fn name(&self) -> &'static str {
        "delete_port_record"
    }

    fn execute(&mut self, ctx: &mut StepContext<DetachData>) -> StepResult {
        let record = ctx.payload().record(ctx.repeat_index())?;
        let store = self.services.store();
        self.services.call("delete_port_record", || {
            store.delete_port_record(&record.pod, &record.interface)
        })?;
        debug!(interface = %record.interface, pod = %record.pod, "detached interface");
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<DetachData>) {
        let Ok(record) = ctx.payload().record(ctx.repeat_index()) else {
            return;
        };
        let store = self.services.store();
        best_effort(
            "put_port_record",
            self.services
                .call("put_port_record", || store.put_port_record(record)),
        );
    }

    fn compensation_description(&self) -> String {
        "restore the port record".to_string()
    }
}

/// Takes the network's exclusion token and re-reads the network record,
/// which may have changed while the ports were being removed.
pub(super) struct AcquireNetworkLock {
    services: NetworkServices,
}

impl AcquireNetworkLock {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<DetachData, OperationError> for AcquireNetworkLock {
    fn name(&self) -> &'static str {
        "acquire_network_lock"
    }

    fn execute(&mut self, ctx: &mut StepContext<DetachData>) -> StepResult {
        let data = ctx.payload_mut();
        let guard = self.services.lock_network(&data.request.network)?;
        data.network_lock = Some(guard);

        let store = self.services.store();
        let network = &data.request.network;
        let record = self
            .services
            .call("network_record", || store.network_record(network))?;
        data.network = record;
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<DetachData>) {
        if let Some(guard) = ctx.payload_mut().network_lock.take() {
            guard.release();
        }
    }

    fn compensation_description(&self) -> String {
        "release the network lock".to_string()
    }
}

pub(super) struct UnregisterNetworkUsers {
    services: NetworkServices,
}

impl UnregisterNetworkUsers {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<DetachData, OperationError> for UnregisterNetworkUsers {
    fn name(&self) -> &'static str {
        "unregister_network_users"
    }

    fn execute(&mut self, ctx: &mut StepContext<DetachData>) -> StepResult {
        let data = ctx.payload_mut();
        let store = self.services.store();
        let user = data.request.pod.to_string();
        let network = &data.request.network;
        let remaining = self.services.call("remove_network_user", || {
            store.remove_network_user(network, &user)
        })?;
        debug!(%network, pod = %user, remaining, "unregistered network user");
        data.remaining_users = Some(remaining);
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<DetachData>) {
        let data = ctx.payload_mut();
        if data.remaining_users.take().is_none() || data.network.is_none() {
            return;
        }
        let store = self.services.store();
        let user = data.request.pod.to_string();
        let network = &data.request.network;
        best_effort(
            "add_network_user",
            self.services
                .call("add_network_user", || store.add_network_user(network, &user)),
        );
    }

    fn compensation_description(&self) -> String {
        "add the pod back to the network's users".to_string()
    }
}

/// The network has no users left and a record to tear down.
pub(super) struct NetworkUnused;

impl Predicate<DetachData> for NetworkUnused {
    fn ok(&mut self, ctx: &mut StepContext<DetachData>) -> bool {
        let data = ctx.payload();
        data.remaining_users == Some(0) && data.network.is_some()
    }
}

pub(super) struct DeleteNetworkRecord {
    services: NetworkServices,
}

impl DeleteNetworkRecord {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<DetachData, OperationError> for DeleteNetworkRecord {
    fn name(&self) -> &'static str {
        "delete_network_record"
    }

    fn execute(&mut self, ctx: &mut StepContext<DetachData>) -> StepResult {
        let network = ctx.payload().network_record()?;
        let store = self.services.store();
        self.services.call("delete_network_record", || {
            store.delete_network_record(&network.name)
        })?;
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<DetachData>) {
        let Ok(network) = ctx.payload().network_record() else {
            return;
        };
        let store = self.services.store();
        best_effort(
            "put_network_record",
            self.services
                .call("put_network_record", || store.put_network_record(network)),
        );
    }

    fn compensation_description(&self) -> String {
        "restore the network record".to_string()
    }
}

pub(super) struct DeleteTenantNetwork {
    services: NetworkServices,
}

impl DeleteTenantNetwork {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<DetachData, OperationError> for DeleteTenantNetwork {
    fn name(&self) -> &'static str {
        "delete_tenant_network"
    }

    fn execute(&mut self, ctx: &mut StepContext<DetachData>) -> StepResult {
        let network = ctx.payload().network_record()?;
        let controller = self.services.controller();
        self.services.call("delete_network", || {
            controller.delete_network(&network.controller_id)
        })?;
        debug!(network = %network.name, controller_id = %network.controller_id, "deleted tenant network");
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<DetachData>) {
        let Some(network) = ctx.payload_mut().network.as_mut() else {
            return;
        };
        let controller = self.services.controller();
        match self.services.call("create_network", || {
            controller.create_network(&network.name, &network.tenant, network.vlan)
        }) {
            Ok(id) => network.controller_id = id,
            Err(err) => best_effort::<()>("create_network", Err(err)),
        }
    }

    fn compensation_description(&self) -> String {
        "re-create the tenant network".to_string()
    }
}

pub(super) struct ReleaseVlan {
    services: NetworkServices,
}

impl ReleaseVlan {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<DetachData, OperationError> for ReleaseVlan {
    fn name(&self) -> &'static str {
        "release_vlan"
    }

    fn execute(&mut self, ctx: &mut StepContext<DetachData>) -> StepResult {
        let vlan = ctx.payload().network_record()?.vlan;
        let store = self.services.store();
        self.services
            .call("release_vlan", || store.release_vlan(vlan))?;
        debug!(vlan, "released VLAN");
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<DetachData>) {
        let Ok(network) = ctx.payload().network_record() else {
            return;
        };
        let only = VlanRange::new(network.vlan, network.vlan);
        let store = self.services.store();
        best_effort(
            "reserve_vlan",
            self.services.call("reserve_vlan", || store.reserve_vlan(only)),
        );
    }

    fn compensation_description(&self) -> String {
        "reserve the VLAN again".to_string()
    }
}
