use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Identifies one acquisition of a [`BinarySemaphore`].
pub(crate) type Ticket = u64;

#[derive(Debug, Default)]
struct Slot {
    holder: Option<Ticket>,
    issued: Ticket,
}

impl Slot {
    fn grant(&mut self) -> Ticket {
        self.issued += 1;
        self.holder = Some(self.issued);
        self.issued
    }
}

/// A semaphore holding at most one token.
///
/// Every acquisition gets a ticket and only the current ticket can return
/// the token, so a stale holder can never put a second token into the slot.
#[derive(Debug, Default)]
pub(crate) struct BinarySemaphore {
    slot: Mutex<Slot>,
    returned: Condvar,
}

impl BinarySemaphore {
    /// Creates a semaphore pre-loaded with its token.
    pub(crate) fn new() -> Self {
        Self::default()
    }

    // The critical sections only touch two integers, so a poisoned lock
    // still holds a consistent value.
    fn lock(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Blocks until the token is available and takes it.
    pub(crate) fn take(&self) -> Ticket {
        let mut slot = self
            .returned
            .wait_while(self.lock(), |slot| slot.holder.is_some())
            .unwrap_or_else(PoisonError::into_inner);
        slot.grant()
    }

    /// Takes the token if it is available right now.
    pub(crate) fn try_take(&self) -> Option<Ticket> {
        let mut slot = self.lock();
        slot.holder.is_none().then(|| slot.grant())
    }

    /// Waits up to `timeout` for the token.
    pub(crate) fn take_timeout(&self, timeout: Duration) -> Option<Ticket> {
        let (mut slot, _) = self
            .returned
            .wait_timeout_while(self.lock(), timeout, |slot| slot.holder.is_some())
            .unwrap_or_else(PoisonError::into_inner);
        slot.holder.is_none().then(|| slot.grant())
    }

    /// Returns the token held under `ticket`. Returns `false` if that ticket
    /// no longer holds it.
    pub(crate) fn give(&self, ticket: Ticket) -> bool {
        let mut slot = self.lock();
        if slot.holder != Some(ticket) {
            return false;
        }
        slot.holder = None;
        drop(slot);
        self.returned.notify_one();
        true
    }

    /// Returns the token on behalf of whoever holds it. Returns `false` if
    /// it was already available.
    pub(crate) fn force_give(&self) -> bool {
        let mut slot = self.lock();
        if slot.holder.take().is_none() {
            return false;
        }
        drop(slot);
        self.returned.notify_one();
        true
    }

    pub(crate) fn is_available(&self) -> bool {
        self.lock().holder.is_none()
    }
}
