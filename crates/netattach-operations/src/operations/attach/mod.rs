//! Plugs a pod's interfaces into a tenant network.
//!
//! The tenant network is shared by every pod attached to it. The first pod
//! to arrive creates it, under the network's exclusion token so that two
//! pods racing for the same network never both create it.

mod steps;

use netattach_exclusion::ResourceGuard;
use netattach_saga::{Outcome, Procedure, StepContext, Transaction};
use tracing::{debug, info, warn};

use self::steps::{
    AddBridgePort, AllocateVlan, CreateLogicalPort, CreateTenantNetwork, NetworkAbsent,
    PersistNetworkRecord, PersistPortRecord, RegisterNetworkUsers, ValidateAttachRequest,
    WritePortFlows,
};
use super::lock::{NetworkLockHolder, ReleaseNetworkLock};
use crate::error::{OperationError, Result};
use crate::services::NetworkServices;
use crate::types::{
    AttachRequest, InterfaceRequest, LogicalPort, PortRecord, TenantNetwork, flow_cookie,
};

/// Progress of one requested interface.
#[derive(Debug, Clone, Default)]
pub struct PortProgress {
    /// A port record existed before the workflow started.
    pub existing: bool,
    pub logical_port: Option<LogicalPort>,
    pub bridge_port: Option<String>,
    pub flow_cookie: Option<u64>,
    pub record: Option<PortRecord>,
}

#[derive(Debug)]
pub struct AttachData {
    pub request: AttachRequest,
    /// Network record, either found or created by this workflow.
    pub network: Option<TenantNetwork>,
    pub network_lock: Option<ResourceGuard>,
    /// Failure hit while deciding whether the network exists, raised by the
    /// first step that needs the answer.
    pub lookup_error: Option<OperationError>,
    pub vlan: Option<u16>,
    pub controller_network_id: Option<String>,
    pub created_network: bool,
    /// One entry per requested interface, indexed by repeat index.
    pub ports: Vec<PortProgress>,
    pub registered: bool,
}

impl AttachData {
    #[must_use]
    pub fn new(request: AttachRequest) -> Self {
        Self {
            request,
            network: None,
            network_lock: None,
            lookup_error: None,
            vlan: None,
            controller_network_id: None,
            created_network: false,
            ports: Vec::new(),
            registered: false,
        }
    }

    pub(crate) fn interface(&self, index: usize) -> Result<&InterfaceRequest> {
        self.request
            .interfaces
            .get(index)
            .ok_or(OperationError::MissingState("requested interface"))
    }

    pub(crate) fn progress(&self, index: usize) -> Result<&PortProgress> {
        self.ports
            .get(index)
            .ok_or(OperationError::MissingState("interface progress"))
    }

    pub(crate) fn progress_mut(&mut self, index: usize) -> Result<&mut PortProgress> {
        self.ports
            .get_mut(index)
            .ok_or(OperationError::MissingState("interface progress"))
    }

    /// The record interface `index` will be stored under, once its logical
    /// and bridge ports exist.
    pub(crate) fn pending_record(&self, index: usize, bridge: &str) -> Result<PortRecord> {
        let progress = self.progress(index)?;
        let port = progress
            .logical_port
            .as_ref()
            .ok_or(OperationError::MissingState("logical port"))?;
        let bridge_port = progress
            .bridge_port
            .clone()
            .ok_or(OperationError::MissingState("bridge port"))?;
        Ok(PortRecord {
            pod: self.request.pod.clone(),
            interface: self.interface(index)?.name.clone(),
            network: self.request.network.clone(),
            port_id: port.id.clone(),
            bridge: bridge.to_string(),
            bridge_port,
            vlan: self.vlan.ok_or(OperationError::MissingState("VLAN"))?,
            mac: port.mac.clone(),
            flow_cookie: flow_cookie(&port.id),
        })
    }
}

impl NetworkLockHolder for AttachData {
    fn network_lock(&mut self) -> &mut Option<ResourceGuard> {
        &mut self.network_lock
    }
}

/// Builds the attach workflow.
#[must_use]
pub fn attach_workflow(services: &NetworkServices) -> Transaction<AttachData, OperationError> {
    let create_network = Procedure::<AttachData, OperationError>::builder("create_network")
        .step(AllocateVlan::new(services.clone()))
        .step(CreateTenantNetwork::new(services.clone()))
        .step(PersistNetworkRecord::new(services.clone()))
        .build();

    let per_interface = services.clone();
    Transaction::<AttachData, OperationError>::builder("attach")
        .step(ValidateAttachRequest::new(services.clone()))
        .optional(NetworkAbsent::new(services.clone()), create_network)
        .repeat("attach_interface", move || {
            Procedure::<AttachData, OperationError>::builder("attach_interface")
                .step(CreateLogicalPort::new(per_interface.clone()))
                .step(AddBridgePort::new(per_interface.clone()))
                .step(WritePortFlows::new(per_interface.clone()))
                .step(PersistPortRecord::new(per_interface.clone()))
                .build()
        })
        .step(RegisterNetworkUsers::new(services.clone()))
        .step(ReleaseNetworkLock::new())
        .build()
}

/// Attaches the requested interfaces of a pod to a tenant network.
///
/// Returns [`Outcome::Stopped`] when there was nothing to do, either
/// because no interfaces were requested or because all of them are
/// already attached.
///
/// # Errors
///
/// Returns the error that made the attach fail. Everything the attach
/// created has been removed again by the time it is returned.
pub fn attach(services: &NetworkServices, request: AttachRequest) -> Result<Outcome> {
    let pod = request.pod.to_string();
    let network = request.network.clone();
    info!(%pod, %network, interfaces = request.interfaces.len(), "attaching pod");

    let mut workflow = attach_workflow(services);
    let mut ctx = StepContext::new(AttachData::new(request));
    let result = workflow.run(&mut ctx);
    debug!(audit = %ctx.audit().summary(), "attach steps");

    match &result {
        Ok(outcome) => info!(%pod, %network, ?outcome, "attach finished"),
        Err(err) => warn!(%pod, %network, error = %err, "attach failed and was rolled back"),
    }
    result
}
