use std::collections::HashSet;

use netattach_saga::{Predicate, Step, StepContext, StepError};
use tracing::debug;

use super::{AttachData, PortProgress};
use crate::OperationError;
use crate::operations::{StepResult, best_effort};
use crate::services::NetworkServices;
use crate::types::{TenantNetwork, bridge_port_name};

pub(super) struct ValidateAttachRequest {
    services: NetworkServices,
}

impl ValidateAttachRequest {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<AttachData, OperationError> for ValidateAttachRequest {
    fn name(&self) -> &'static str {
        "validate_attach_request"
    }

    fn execute(&mut self, ctx: &mut StepContext<AttachData>) -> StepResult {
        let request = &ctx.payload().request;
        if request.network.trim().is_empty() {
            return Err(OperationError::InvalidRequest("network name is empty".to_string()).into());
        }
        if request.tenant.trim().is_empty() {
            return Err(OperationError::InvalidRequest("tenant is empty".to_string()).into());
        }
        if request.interfaces.is_empty() {
            debug!(pod = %request.pod, "no interfaces requested");
            return Err(StepError::Stop);
        }

        let mut seen = HashSet::new();
        let mut ports = Vec::with_capacity(request.interfaces.len());
        for interface in &request.interfaces {
            if interface.name.trim().is_empty() {
                return Err(
                    OperationError::InvalidRequest("interface name is empty".to_string()).into(),
                );
            }
            if !seen.insert(interface.name.as_str()) {
                return Err(OperationError::InvalidRequest(format!(
                    "interface {} requested twice",
                    interface.name
                ))
                .into());
            }
            let store = self.services.store();
            let existing = self.services.call("port_record", || {
                store.port_record(&request.pod, &interface.name)
            })?;
            if let Some(record) = &existing {
                if record.network != request.network {
                    return Err(OperationError::AlreadyExists(format!(
                        "interface {} of {} on network {}",
                        interface.name, request.pod, record.network
                    ))
                    .into());
                }
            }
            ports.push(PortProgress {
                existing: existing.is_some(),
                ..PortProgress::default()
            });
        }

        if ports.iter().all(|port| port.existing) {
            debug!(pod = %request.pod, network = %request.network, "pod already attached");
            return Err(StepError::Stop);
        }

        let count = ports.len();
        ctx.payload_mut().ports = ports;
        ctx.set_repeat_count(count);
        Ok(())
    }
}

/// Takes the network's exclusion token, then answers whether the network
/// still has to be created.
///
/// The token stays parked in the payload until `release_network_lock` or
/// the end of the workflow, so no other attach or detach can change the
/// network in between. A failed lookup cannot be reported from here; it
/// is parked as well and raised by `allocate_vlan`.
pub(super) struct NetworkAbsent {
    services: NetworkServices,
}

impl NetworkAbsent {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Predicate<AttachData> for NetworkAbsent {
    fn ok(&mut self, ctx: &mut StepContext<AttachData>) -> bool {
        let data = ctx.payload_mut();
        match self.services.lock_network(&data.request.network) {
            Ok(guard) => data.network_lock = Some(guard),
            Err(err) => {
                data.lookup_error = Some(err);
                return true;
            }
        }

        let store = self.services.store();
        let name = data.request.network.clone();
        match self
            .services
            .call("network_record", || store.network_record(&name))
        {
            Ok(Some(network)) if network.tenant != data.request.tenant => {
                data.lookup_error = Some(OperationError::InvalidRequest(format!(
                    "network {} belongs to tenant {}",
                    network.name, network.tenant
                )));
                true
            }
            Ok(Some(network)) => {
                debug!(network = %network.name, vlan = network.vlan, "joining existing network");
                data.vlan = Some(network.vlan);
                data.controller_network_id = Some(network.controller_id.clone());
                data.network = Some(network);
                false
            }
            Ok(None) => {
                debug!(network = %name, "network absent, creating it");
                true
            }
            Err(err) => {
                data.lookup_error = Some(err);
                true
            }
        }
    }
}

pub(super) struct AllocateVlan {
    services: NetworkServices,
}

impl AllocateVlan {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<AttachData, OperationError> for AllocateVlan {
    fn name(&self) -> &'static str {
        "allocate_vlan"
    }

    fn execute(&mut self, ctx: &mut StepContext<AttachData>) -> StepResult {
        let data = ctx.payload_mut();
        if let Some(err) = data.lookup_error.take() {
            return Err(err.into());
        }
        let range = self.services.config().vlan_range;
        let store = self.services.store();
        let vlan = self
            .services
            .call("reserve_vlan", || store.reserve_vlan(range))?;
        debug!(network = %data.request.network, vlan, "reserved VLAN");
        data.vlan = Some(vlan);
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<AttachData>) {
        if let Some(vlan) = ctx.payload_mut().vlan.take() {
            let store = self.services.store();
            best_effort(
                "release_vlan",
                self.services.call("release_vlan", || store.release_vlan(vlan)),
            );
        }
    }

    fn compensation_description(&self) -> String {
        "release the reserved VLAN".to_string()
    }
}

pub(super) struct CreateTenantNetwork {
    services: NetworkServices,
}

impl CreateTenantNetwork {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<AttachData, OperationError> for CreateTenantNetwork {
    fn name(&self) -> &'static str {
        "create_tenant_network"
    }

    fn execute(&mut self, ctx: &mut StepContext<AttachData>) -> StepResult {
        let data = ctx.payload_mut();
        let vlan = data.vlan.ok_or(OperationError::MissingState("VLAN"))?;
        let controller = self.services.controller();
        let id = self.services.call("create_network", || {
            controller.create_network(&data.request.network, &data.request.tenant, vlan)
        })?;
        debug!(network = %data.request.network, controller_id = %id, "created tenant network");
        data.controller_network_id = Some(id);
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<AttachData>) {
        if let Some(id) = ctx.payload_mut().controller_network_id.take() {
            let controller = self.services.controller();
            best_effort(
                "delete_network",
                self.services
                    .call("delete_network", || controller.delete_network(&id)),
            );
        }
    }

    fn compensation_description(&self) -> String {
        "delete the tenant network from the controller".to_string()
    }
}

pub(super) struct PersistNetworkRecord {
    services: NetworkServices,
}

impl PersistNetworkRecord {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<AttachData, OperationError> for PersistNetworkRecord {
    fn name(&self) -> &'static str {
        "persist_network_record"
    }

    fn execute(&mut self, ctx: &mut StepContext<AttachData>) -> StepResult {
        let data = ctx.payload_mut();
        let record = TenantNetwork {
            name: data.request.network.clone(),
            tenant: data.request.tenant.clone(),
            vlan: data.vlan.ok_or(OperationError::MissingState("VLAN"))?,
            controller_id: data
                .controller_network_id
                .clone()
                .ok_or(OperationError::MissingState("controller network ID"))?,
            users: Vec::new(),
        };
        let store = self.services.store();
        self.services
            .call("put_network_record", || store.put_network_record(&record))?;
        data.network = Some(record);
        data.created_network = true;
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<AttachData>) {
        let data = ctx.payload_mut();
        if !data.created_network {
            return;
        }
        let store = self.services.store();
        let name = data.request.network.clone();
        best_effort(
            "delete_network_record",
            self.services
                .call("delete_network_record", || store.delete_network_record(&name)),
        );
        data.network = None;
        data.created_network = false;
    }

    fn compensation_description(&self) -> String {
        "delete the network record".to_string()
    }
}

pub(super) struct CreateLogicalPort {
    services: NetworkServices,
}

impl CreateLogicalPort {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<AttachData, OperationError> for CreateLogicalPort {
    fn name(&self) -> &'static str {
        "create_logical_port"
    }

    fn execute(&mut self, ctx: &mut StepContext<AttachData>) -> StepResult {
        let index = ctx.repeat_index();
        let data = ctx.payload_mut();
        let interface = data.interface(index)?.clone();
        if data.progress(index)?.existing {
            debug!(interface = %interface.name, "interface already attached, skipping");
            return Err(StepError::Continue);
        }
        let network_id = data
            .controller_network_id
            .clone()
            .ok_or(OperationError::MissingState("controller network ID"))?;

        let controller = self.services.controller();
        let port = self.services.call("create_port", || {
            controller.create_port(&network_id, interface.mac.as_deref())
        })?;
        debug!(interface = %interface.name, port = %port.id, mac = %port.mac, "created logical port");
        data.progress_mut(index)?.logical_port = Some(port);
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<AttachData>) {
        let index = ctx.repeat_index();
        let Ok(progress) = ctx.payload_mut().progress_mut(index) else {
            return;
        };
        if let Some(port) = progress.logical_port.take() {
            let controller = self.services.controller();
            best_effort(
                "delete_port",
                self.services
                    .call("delete_port", || controller.delete_port(&port.id)),
            );
        }
    }

    fn compensation_description(&self) -> String {
        "delete the logical port from the controller".to_string()
    }
}

pub(super) struct AddBridgePort {
    services: NetworkServices,
}

impl AddBridgePort {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<AttachData, OperationError> for AddBridgePort {
    fn name(&self) -> &'static str {
        "add_bridge_port"
    }

    fn execute(&mut self, ctx: &mut StepContext<AttachData>) -> StepResult {
        let index = ctx.repeat_index();
        let data = ctx.payload_mut();
        let port_name = data
            .progress(index)?
            .logical_port
            .as_ref()
            .map(|port| bridge_port_name(&port.id))
            .ok_or(OperationError::MissingState("logical port"))?;
        let vlan = data.vlan.ok_or(OperationError::MissingState("VLAN"))?;

        let bridge = &self.services.config().bridge;
        let provider = self.services.bridge();
        self.services
            .call("add_port", || provider.add_port(bridge, &port_name, vlan))?;
        debug!(%bridge, port = %port_name, vlan, "added bridge port");
        data.progress_mut(index)?.bridge_port = Some(port_name);
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<AttachData>) {
        let index = ctx.repeat_index();
        let Ok(progress) = ctx.payload_mut().progress_mut(index) else {
            return;
        };
        if let Some(port_name) = progress.bridge_port.take() {
            let bridge = &self.services.config().bridge;
            let provider = self.services.bridge();
            best_effort(
                "remove_port",
                self.services
                    .call("remove_port", || provider.remove_port(bridge, &port_name)),
            );
        }
    }

    fn compensation_description(&self) -> String {
        "remove the port from the bridge".to_string()
    }
}

/// Writes the ingress and egress flows of one port. If one of them cannot
/// be written, the flows already written are removed before failing.
pub(super) struct WritePortFlows {
    services: NetworkServices,
}

impl WritePortFlows {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<AttachData, OperationError> for WritePortFlows {
    fn name(&self) -> &'static str {
        "write_port_flows"
    }

    fn execute(&mut self, ctx: &mut StepContext<AttachData>) -> StepResult {
        let index = ctx.repeat_index();
        let data = ctx.payload_mut();
        let bridge = &self.services.config().bridge;
        let record = data.pending_record(index, bridge)?;

        let provider = self.services.bridge();
        for rule in record.flows() {
            if let Err(err) = self.services.call("add_flow", || provider.add_flow(&rule)) {
                best_effort(
                    "remove_flows",
                    self.services.call("remove_flows", || {
                        provider.remove_flows(bridge, record.flow_cookie)
                    }),
                );
                return Err(err.into());
            }
        }
        debug!(port = %record.bridge_port, cookie = record.flow_cookie, "wrote port flows");
        data.progress_mut(index)?.flow_cookie = Some(record.flow_cookie);
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<AttachData>) {
        let index = ctx.repeat_index();
        let Ok(progress) = ctx.payload_mut().progress_mut(index) else {
            return;
        };
        if let Some(cookie) = progress.flow_cookie.take() {
            let bridge = &self.services.config().bridge;
            let provider = self.services.bridge();
            best_effort(
                "remove_flows",
                self.services
                    .call("remove_flows", || provider.remove_flows(bridge, cookie)),
            );
        }
    }

    fn compensation_description(&self) -> String {
        "remove the port's flows".to_string()
    }
}

pub(super) struct PersistPortRecord {
    services: NetworkServices,
}

impl PersistPortRecord {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<AttachData, OperationError> for PersistPortRecord {
    fn name(&self) -> &'static str {
        "persist_port_record"
    }

    fn execute(&mut self, ctx: &mut StepContext<AttachData>) -> StepResult {
        let index = ctx.repeat_index();
        let data = ctx.payload_mut();
        let record = data.pending_record(index, &self.services.config().bridge)?;
        let store = self.services.store();
        self.services
            .call("put_port_record", || store.put_port_record(&record))?;
        data.progress_mut(index)?.record = Some(record);
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<AttachData>) {
        let index = ctx.repeat_index();
        let Ok(progress) = ctx.payload_mut().progress_mut(index) else {
            return;
        };
        if let Some(record) = progress.record.take() {
            let store = self.services.store();
            best_effort(
                "delete_port_record",
                self.services.call("delete_port_record", || {
                    store.delete_port_record(&record.pod, &record.interface)
                }),
            );
        }
    }

    fn compensation_description(&self) -> String {
        "delete the port record".to_string()
    }
}

pub(super) struct RegisterNetworkUsers {
    services: NetworkServices,
}

impl RegisterNetworkUsers {
    pub(super) fn new(services: NetworkServices) -> Self {
        Self { services }
    }
}

impl Step<AttachData, OperationError> for RegisterNetworkUsers {
    fn name(&self) -> &'static str {
        "register_network_users"
    }

    fn execute(&mut self, ctx: &mut StepContext<AttachData>) -> StepResult {
        let data = ctx.payload_mut();
        let network = data
            .network
            .as_ref()
            .ok_or(OperationError::MissingState("network record"))?;
        let user = data.request.pod.to_string();
        let already_registered = network.users.contains(&user);

        let store = self.services.store();
        let users = self.services.call("add_network_user", || {
            store.add_network_user(&network.name, &user)
        })?;
        debug!(network = %network.name, pod = %user, users, "registered network user");
        data.registered = !already_registered;
        Ok(())
    }

    fn rollback(&mut self, ctx: &mut StepContext<AttachData>) {
        let data = ctx.payload_mut();
        if !data.registered {
            return;
        }
        let store = self.services.store();
        let user = data.request.pod.to_string();
        best_effort(
            "remove_network_user",
            self.services.call("remove_network_user", || {
                store.remove_network_user(&data.request.network, &user)
            }),
        );
        data.registered = false;
    }

    fn compensation_description(&self) -> String {
        "remove the pod from the network's users".to_string()
    }
}
