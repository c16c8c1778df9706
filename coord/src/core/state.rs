use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::core::meta::FileTable;
use crate::core::node::NodeRegistry;
use crate::core::op::NodeClient;
use crate::core::placement::PlacementStrategy;

#[derive(Clone)]
pub struct CoordinatorState {
    pub registry: NodeRegistry,
    pub files: FileTable,
    pub node_client: NodeClient,

    pub inflight: Arc<Semaphore>,
    pub max_size: u64,
    /// Bound on every read from a client connection.
    pub io_timeout: Duration,

    pub n_replicas: usize,
    pub min_replicas: usize,
    pub placement: PlacementStrategy,

    /// Used to derive a node address when REGISTER does not carry one.
    pub node_host: String,
    pub node_base_port: u16,
}
