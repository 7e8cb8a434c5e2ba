//! Per-resource exclusion for workflows that share external resources.
//!
//! A [`ResourceRegistry`] maps resource keys, such as network identifiers,
//! to a single token. Acquiring the token yields a [`ResourceGuard`] that
//! puts it back exactly once, on explicit release or on drop.

mod error;
mod registry;
mod semaphore;

pub use error::{ExclusionError, Result};
pub use registry::{ResourceGuard, ResourceRegistry};
