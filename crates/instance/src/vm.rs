use std::path::{Path, PathBuf};

use serde::Serialize;

use nimbus_core::ObjectId;

/// A disk attached to an instance, as reported by the disk service. `index`
/// is the ordinal the disk should appear at and arrives as a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disk {
    pub id: ObjectId,
    pub index: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VmDisk {
    pub index: i64,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkAdapter {
    pub mac_address: String,
    pub host_interface: String,
}

/// Everything the hypervisor manager needs to run one instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VirtualMachine {
    pub id: ObjectId,
    pub image: Option<ObjectId>,
    pub processors: i64,
    pub memory: i64,
    pub disks: Vec<VmDisk>,
    pub network_adapters: Vec<NetworkAdapter>,
}

/// Stable locally administered unicast address for `id`.
pub fn mac_address(id: ObjectId) -> String {
    let hash = blake3::hash(id.as_bytes());
    let mut octets = [0u8; 6];
    octets[0] = 0x02;
    octets[1..].copy_from_slice(&hash.as_bytes()[..5]);
    octets
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(":")
}

pub fn disk_path(disk_root: &Path, id: ObjectId) -> PathBuf {
    disk_root.join(format!("{id}.qcow2"))
}
