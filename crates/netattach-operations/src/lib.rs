//! Attach and detach workflows for container network ports.
//!
//! A pod attach touches a software bridge, a key-value store and a network
//! controller. Each workflow is a [`netattach_saga::Transaction`], so a
//! failure part way through undoes everything the workflow already did.

pub mod config;
mod error;
pub mod operations;
pub mod providers;
pub mod retry;
mod services;
pub mod traits;
pub mod types;

pub use config::Config;
pub use error::{OperationError, Result};
pub use operations::{attach, detach};
pub use services::{NetworkServices, network_lock_key};
