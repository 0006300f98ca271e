use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_BRIDGE_NAME: &str = "nimbusbr0";
pub const DEFAULT_DISK_ROOT: &str = "/var/lib/nimbus/disks";

/// Host-wide settings the execution descriptor is built against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Bridge every instance network adapter is attached to.
    pub bridge_name: String,
    pub disk_root: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            bridge_name: DEFAULT_BRIDGE_NAME.to_string(),
            disk_root: PathBuf::from(DEFAULT_DISK_ROOT),
        }
    }
}

impl HostConfig {
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
