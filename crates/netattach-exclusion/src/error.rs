use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExclusionError {
    #[error("no exclusion token has ever been created for resource '{0}'")]
    UnknownResource(String),

    #[error("exclusion token for resource '{0}' is already released")]
    AlreadyReleased(String),

    #[error("timed out after {timeout:?} waiting for resource '{key}'")]
    Timeout { key: String, timeout: Duration },
}

pub type Result<T> = std::result::Result<T, ExclusionError>;
