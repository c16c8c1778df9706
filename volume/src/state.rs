use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use common::NodeId;

use crate::fault_injection::FaultInjector;

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum DurabilityLevel {
    Immediate, // fsync file and directory on each STORE (default, safest)
    OS,        // no explicit fsync; rely on OS (fastest)
}

#[derive(Clone)]
pub struct VolumeState {
    pub node_id: NodeId,
    pub data_root: Arc<PathBuf>,
    pub coordinator_addr: String,
    pub advertise_addr: String,
    pub max_size: u64,
    pub io_timeout: Duration,
    pub fault_injector: Arc<FaultInjector>,
    pub durability_level: DurabilityLevel,
}
