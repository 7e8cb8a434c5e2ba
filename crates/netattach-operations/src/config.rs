use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OperationError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "netattach.toml";
pub const DEFAULT_BRIDGE: &str = "br-int";

const MAX_VLAN: u16 = 4094;

/// Inclusive range of VLAN IDs handed out to tenant networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VlanRange {
    pub start: u16,
    pub end: u16,
}

impl VlanRange {
    #[must_use]
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn iter(&self) -> impl Iterator<Item = u16> {
        self.start..=self.end
    }
}

impl Default for VlanRange {
    fn default() -> Self {
        Self {
            start: 100,
            end: 3999,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub bridge: String,
    #[serde(rename = "vlan-range")]
    pub vlan_range: VlanRange,
    #[serde(rename = "retry-attempts")]
    pub retry_attempts: u32,
    #[serde(rename = "retry-delay-ms")]
    pub retry_delay_ms: u64,
    /// Bounded wait for a network's exclusion token. `None` waits forever.
    #[serde(rename = "lock-timeout-ms", skip_serializing_if = "Option::is_none")]
    pub lock_timeout_ms: Option<u64>,
    #[serde(rename = "state-file", skip_serializing_if = "Option::is_none")]
    pub state_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bridge: DEFAULT_BRIDGE.to_string(),
            vlan_range: VlanRange::default(),
            retry_attempts: 3,
            retry_delay_ms: 100,
            lock_timeout_ms: None,
            state_file: None,
        }
    }
}

impl Config {
    /// Reads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML for
    /// this structure, or fails [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| OperationError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| OperationError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`Config::load`], but falls back to defaults when `path` does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be loaded.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// # Errors
    ///
    /// Returns [`OperationError::InvalidConfig`] describing the first
    /// offending setting.
    pub fn validate(&self) -> Result<()> {
        if self.bridge.trim().is_empty() {
            return Err(OperationError::InvalidConfig(
                "bridge name must not be empty".to_string(),
            ));
        }
        let VlanRange { start, end } = self.vlan_range;
        if start == 0 || end > MAX_VLAN {
            return Err(OperationError::InvalidConfig(format!(
                "vlan-range {start}..={end} must lie within 1..={MAX_VLAN}"
            )));
        }
        if start > end {
            return Err(OperationError::InvalidConfig(format!(
                "vlan-range start {start} is greater than end {end}"
            )));
        }
        if self.retry_attempts == 0 {
            return Err(OperationError::InvalidConfig(
                "retry-attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    #[must_use]
    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }

    #[must_use]
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }
}
