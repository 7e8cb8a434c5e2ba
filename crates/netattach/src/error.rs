use std::path::PathBuf;

use netattach_operations::OperationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("failed to load configuration")]
    Config(#[source] OperationError),

    #[error("failed to open state file '{path}'")]
    State {
        path: PathBuf,
        #[source]
        source: OperationError,
    },

    #[error("failed to attach {pod} to network '{network}'")]
    Attach {
        pod: String,
        network: String,
        #[source]
        source: OperationError,
    },

    #[error("failed to detach {pod} from network '{network}'")]
    Detach {
        pod: String,
        network: String,
        #[source]
        source: OperationError,
    },

    #[error("failed to initialize logging")]
    TracingInit,
}

pub type Result<T> = std::result::Result<T, CliError>;
