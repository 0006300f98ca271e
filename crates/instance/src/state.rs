use std::fmt;

use serde::{Deserialize, Serialize};

use nimbus_core::CoreError;

/// What the operator wants the instance to be doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstanceState {
    Running,
    Stopped,
    Updating,
    Deleting,
    Snapshot,
}

impl InstanceState {
    pub const ALL: [InstanceState; 5] = [
        Self::Running,
        Self::Stopped,
        Self::Updating,
        Self::Deleting,
        Self::Snapshot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Updating => "updating",
            Self::Deleting => "deleting",
            Self::Snapshot => "snapshot",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "updating" => Ok(Self::Updating),
            "deleting" => Ok(Self::Deleting),
            "snapshot" => Ok(Self::Snapshot),
            _ => Err(CoreError::InvalidData(format!("unknown instance state: {s}"))),
        }
    }
}

/// What the hypervisor agent last reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VmState {
    Starting,
    Running,
    Stopped,
    Failed,
    Updating,
    ProvisioningDisk,
}

impl VmState {
    pub const ALL: [VmState; 6] = [
        Self::Starting,
        Self::Running,
        Self::Stopped,
        Self::Failed,
        Self::Updating,
        Self::ProvisioningDisk,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Updating => "updating",
            Self::ProvisioningDisk => "provisioning_disk",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "starting" => Ok(Self::Starting),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "failed" => Ok(Self::Failed),
            "updating" => Ok(Self::Updating),
            "provisioning_disk" => Ok(Self::ProvisioningDisk),
            _ => Err(CoreError::InvalidData(format!("unknown vm state: {s}"))),
        }
    }
}

/// Operator-facing status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Provisioning,
    ProvisioningDisk,
    Starting,
    Running,
    Stopping,
    Stopped,
    Updating,
    Deleting,
    Snapshotting,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Provisioning => "Provisioning",
            Self::ProvisioningDisk => "Provisioning Disk",
            Self::Starting => "Starting",
            Self::Running => "Running",
            Self::Stopping => "Stopping",
            Self::Stopped => "Stopped",
            Self::Updating => "Updating",
            Self::Deleting => "Deleting",
            Self::Snapshotting => "Snapshotting",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Status {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Resolves intent and observed state into one status. While the intent is
/// running or stopped the agent's report decides whether the instance is
/// still converging; any other intent wins outright.
pub fn derive_status(state: InstanceState, vm_state: Option<VmState>) -> Status {
    use InstanceState as I;
    use VmState as V;

    match (state, vm_state) {
        (I::Running, Some(V::Running)) => Status::Running,
        (I::Running, Some(V::Starting | V::Stopped | V::Failed)) => Status::Starting,
        (I::Stopped, Some(V::Starting | V::Running)) => Status::Stopping,
        (I::Stopped, Some(V::Stopped | V::Failed)) => Status::Stopped,
        (I::Running | I::Stopped, Some(V::Updating)) => Status::Updating,
        (I::Running | I::Stopped, Some(V::ProvisioningDisk)) => Status::ProvisioningDisk,
        (I::Running | I::Stopped, None) => Status::Provisioning,
        (I::Updating, _) => Status::Updating,
        (I::Deleting, _) => Status::Deleting,
        (I::Snapshot, _) => Status::Snapshotting,
    }
}
