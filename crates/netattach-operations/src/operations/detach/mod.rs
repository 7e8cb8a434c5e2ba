//! Unplugs a pod from a tenant network, tearing the network down once its
//! last user is gone.

mod steps;

use netattach_exclusion::ResourceGuard;
use netattach_saga::{Outcome, Procedure, StepContext, Transaction};
use tracing::{debug, info, warn};

use self::steps::{
    AcquireNetworkLock, DeleteLogicalPort, DeleteNetworkRecord, DeletePortRecord,
    DeleteTenantNetwork, LoadAttachment, NetworkUnused, ReleaseVlan, RemoveBridgePort,
    RemovePortFlows, UnregisterNetworkUsers,
};
use super::lock::{NetworkLockHolder, ReleaseNetworkLock};
use crate::error::{OperationError, Result};
use crate::services::NetworkServices;
use crate::types::{DetachRequest, PortRecord, TenantNetwork};

#[derive(Debug)]
pub struct DetachData {
    pub request: DetachRequest,
    /// Port records being removed, indexed by repeat index.
    pub records: Vec<PortRecord>,
    /// Network record as last seen. Compensations keep it current, so a
    /// re-created network is recorded under its new controller ID.
    pub network: Option<TenantNetwork>,
    pub network_lock: Option<ResourceGuard>,
    /// Users left on the network after this pod was removed.
    pub remaining_users: Option<usize>,
}

impl DetachData {
    #[must_use]
    pub fn new(request: DetachRequest) -> Self {
        Self {
            request,
            records: Vec::new(),
            network: None,
            network_lock: None,
            remaining_users: None,
        }
    }

    pub(crate) fn record(&self, index: usize) -> Result<&PortRecord> {
        self.records
            .get(index)
            .ok_or(OperationError::MissingState("port record"))
    }

    pub(crate) fn network_record(&self) -> Result<&TenantNetwork> {
        self.network
            .as_ref()
            .ok_or(OperationError::MissingState("network record"))
    }
}

impl NetworkLockHolder for DetachData {
    fn network_lock(&mut self) -> &mut Option<ResourceGuard> {
        &mut self.network_lock
    }
}

/// Builds the detach workflow.
#[must_use]
pub fn detach_workflow(services: &NetworkServices) -> Transaction<DetachData, OperationError> {
    let delete_network = Procedure::<DetachData, OperationError>::builder("delete_network")
        .step(DeleteNetworkRecord::new(services.clone()))
        .step(DeleteTenantNetwork::new(services.clone()))
        .step(ReleaseVlan::new(services.clone()))
        .build();

    let per_port = services.clone();
    Transaction::<DetachData, OperationError>::builder("detach")
        .step(LoadAttachment::new(services.clone()))
        .repeat("detach_interface", move || {
            Procedure::<DetachData, OperationError>::builder("detach_interface")
                .step(RemovePortFlows::new(per_port.clone()))
                .step(RemoveBridgePort::new(per_port.clone()))
                .step(DeleteLogicalPort::new(per_port.clone()))
                .step(DeletePortRecord::new(per_port.clone()))
                .build()
        })
        .step(AcquireNetworkLock::new(services.clone()))
        .step(UnregisterNetworkUsers::new(services.clone()))
        .optional(NetworkUnused, delete_network)
        .step(ReleaseNetworkLock::new())
        .build()
}

/// Detaches every interface a pod has on a network.
///
/// Returns [`Outcome::Stopped`] when the pod has no ports on the network.
///
/// # Errors
///
/// Returns the error that made the detach fail. Whatever the detach had
/// already removed has been restored by the time it is returned.
pub fn detach(services: &NetworkServices, request: DetachRequest) -> Result<Outcome> {
    let pod = request.pod.to_string();
    let network = request.network.clone();
    info!(%pod, %network, "detaching pod");

    let mut workflow = detach_workflow(services);
    let mut ctx = StepContext::new(DetachData::new(request));
    let result = workflow.run(&mut ctx);
    debug!(audit = %ctx.audit().summary(), "detach steps");

    match &result {
        Ok(outcome) => info!(%pod, %network, ?outcome, "detach finished"),
        Err(err) => warn!(%pod, %network, error = %err, "detach failed and was rolled back"),
    }
    result
}
