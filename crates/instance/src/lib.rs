pub mod config;
pub mod error;
pub mod instance;
pub mod state;
pub mod vm;

pub use config::HostConfig;
pub use error::{ConfigError, ErrorData, InstanceError, ValidationError};
pub use instance::{get, get_all, get_one, Instance, InstanceView};
pub use state::{derive_status, InstanceState, Status, VmState};
pub use vm::{Disk, NetworkAdapter, VirtualMachine, VmDisk};
