pub mod attach;
pub mod detach;
mod lock;

pub use attach::{AttachData, attach};
pub use detach::{DetachData, detach};
pub use lock::{NetworkLockHolder, ReleaseNetworkLock};

use netattach_saga::StepError;
use tracing::warn;

use crate::error::{OperationError, Result};

pub(crate) type StepResult = std::result::Result<(), StepError<OperationError>>;

/// Logs a failed compensation and carries on with the unwind.
pub(crate) fn best_effort<T>(operation: &'static str, result: Result<T>) {
    if let Err(err) = result {
        warn!(operation, error = %err, "compensation failed, continuing");
    }
}
