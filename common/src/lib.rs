pub mod addr_utils;
pub mod checksum;
pub mod constants;
pub mod error;
pub mod file_utils;
pub mod key_utils;
pub mod protocol;
pub mod schemas;
pub mod server;
pub mod telemetry;
pub mod time_utils;

/// Stable identity of a storage node for the lifetime of a coordinator.
pub type NodeId = u32;
