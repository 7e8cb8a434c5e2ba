use std::marker::PhantomData;

use netattach_exclusion::ResourceGuard;
use netattach_saga::{Step, StepContext, StepError};
use tracing::debug;

use crate::OperationError;

/// Payloads that park a network's exclusion token while a workflow runs.
///
/// Whatever path the workflow takes, the token goes back exactly once:
/// through [`ReleaseNetworkLock`] on success, or when the payload is
/// dropped after a failure or an early stop.
pub trait NetworkLockHolder {
    fn network_lock(&mut self) -> &mut Option<ResourceGuard>;
}

/// Returns the network token before the workflow finishes.
pub struct ReleaseNetworkLock<P> {
    _marker: PhantomData<fn(P)>,
}

impl<P> ReleaseNetworkLock<P> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<P> Default for ReleaseNetworkLock<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: NetworkLockHolder> Step<P, OperationError> for ReleaseNetworkLock<P> {
    fn name(&self) -> &'static str {
        "release_network_lock"
    }

    fn execute(&mut self, ctx: &mut StepContext<P>) -> Result<(), StepError<OperationError>> {
        if let Some(guard) = ctx.payload_mut().network_lock().take() {
            debug!(resource = guard.key(), "releasing network lock");
            guard.release();
        }
        Ok(())
    }

    fn compensation_description(&self) -> String {
        "nothing to undo".to_string()
    }
}

#[cfg(test)]
mod tests {
    use netattach_exclusion::ResourceRegistry;

    use super::*;

    struct Holder(Option<ResourceGuard>);

    impl NetworkLockHolder for Holder {
        fn network_lock(&mut self) -> &mut Option<ResourceGuard> {
            &mut self.0
        }
    }

    #[test]
    fn releases_a_held_lock_once() -> anyhow::Result<()> {
        let registry = ResourceRegistry::new();
        let mut ctx = StepContext::new(Holder(Some(registry.acquire("network/blue"))));
        let mut step = ReleaseNetworkLock::new();

        step.execute(&mut ctx)?;
        step.execute(&mut ctx)?;

        assert!(ctx.payload().0.is_none());
        assert!(!registry.is_held("network/blue"));
        Ok(())
    }
}
