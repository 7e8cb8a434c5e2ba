use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("{system} unavailable during {operation}: {reason}")]
    Unavailable {
        system: &'static str,
        operation: &'static str,
        reason: String,
    },

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} is still in use")]
    InUse(String),

    #[error("workflow state is missing the {0}")]
    MissingState(&'static str),

    #[error("no free VLAN in range {start}..={end}")]
    VlanExhausted { start: u16, end: u16 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read configuration file '{path}'")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file '{path}'")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to read state file '{path}'")]
    StateRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write state file '{path}'")]
    StateWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state file '{path}'")]
    StateParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("failed to serialize state for '{path}'")]
    StateSerialize {
        path: PathBuf,
        #[source]
        source: toml::ser::Error,
    },

    #[error("timed out waiting for network '{network}'")]
    Exclusion {
        network: String,
        #[source]
        source: netattach_exclusion::ExclusionError,
    },
}

impl OperationError {
    /// Whether retrying the same call may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

pub type Result<T> = std::result::Result<T, OperationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_transient() {
        let unavailable = OperationError::Unavailable {
            system: "bridge",
            operation: "add_port",
            reason: "connection refused".to_string(),
        };

        assert!(unavailable.is_transient());
        assert!(!OperationError::NotFound("port p1".to_string()).is_transient());
    }

    #[test]
    fn unavailable_message_names_system_and_operation() {
        let err = OperationError::Unavailable {
            system: "controller",
            operation: "create_port",
            reason: "503".to_string(),
        };

        let msg = err.to_string();

        assert!(msg.contains("controller"));
        assert!(msg.contains("create_port"));
    }

    #[test]
    fn vlan_exhausted_message_includes_range() {
        let err = OperationError::VlanExhausted { start: 10, end: 12 };

        assert_eq!(err.to_string(), "no free VLAN in range 10..=12");
    }

    #[test]
    fn state_errors_have_source_chain() {
        let err = OperationError::StateRead {
            path: PathBuf::from("/var/lib/netattach/state.toml"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };

        assert!(std::error::Error::source(&err).is_some());
        assert!(err.to_string().contains("state.toml"));
    }
}
