use anyhow::anyhow;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};
use tracing::info;

use common::NodeId;
use common::error::ApiError;
use common::schemas::NodeStatusLine;

use crate::core::health::{LivenessHandle, LivenessProbe};

#[derive(Clone, Debug)]
pub struct NodeRecord {
    pub node_id: NodeId,
    pub handle: LivenessHandle,
    pub addr: String,       // where the coordinator sends STORE/GET/DELETE
    pub alive: bool,        // last verdict, possibly stale
}

impl NodeRecord {
    pub fn target(&self) -> NodeTarget {
        NodeTarget {
            node_id: self.node_id,
            addr: self.addr.clone(),
        }
    }

    pub fn status_line(&self) -> NodeStatusLine {
        NodeStatusLine {
            node_id: self.node_id,
            addr: self.addr.clone(),
            alive: self.alive,
        }
    }
}

/// Where a single storage node call goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeTarget {
    pub node_id: NodeId,
    pub addr: String,
}

/// Known storage nodes and their last liveness verdict. Records are never
/// removed; a node that stops answering just stays "not alive" until it
/// registers again.
#[derive(Clone)]
pub struct NodeRegistry {
    nodes: Arc<RwLock<BTreeMap<NodeId, NodeRecord>>>,
    probe: Arc<dyn LivenessProbe>,
}

impl NodeRegistry {
    pub fn new(probe: Arc<dyn LivenessProbe>) -> Self {
        Self {
            nodes: Arc::new(RwLock::new(BTreeMap::new())),
            probe,
        }
    }

    /// Inserts or overwrites the record and marks it alive.
    pub fn register(
        &self,
        node_id: NodeId,
        handle: LivenessHandle,
        addr: String,
    ) -> Result<NodeRecord, ApiError> {
        let record = NodeRecord {
            node_id,
            handle,
            addr,
            alive: true,
        };

        let previous = self.write()?.insert(node_id, record.clone());

        match previous {
            Some(prev) if !prev.alive => info!(node_id, addr = %record.addr, "node re-registered"),
            Some(_) => info!(node_id, addr = %record.addr, "node registration replaced"),
            None => info!(node_id, addr = %record.addr, "node registered"),
        }

        Ok(record)
    }

    /// Re-evaluates every node through the probe. Probing happens outside the
    /// lock; a verdict is dropped if the node re-registered in the meantime.
    pub fn refresh_liveness(&self) -> Result<(), ApiError> {
        let handles: Vec<(NodeId, LivenessHandle)> = self
            .read()?
            .values()
            .map(|n| (n.node_id, n.handle.clone()))
            .collect();

        let verdicts: Vec<(NodeId, LivenessHandle, bool)> = handles
            .into_iter()
            .map(|(id, handle)| {
                let alive = self.probe.is_alive(id, &handle);
                (id, handle, alive)
            })
            .collect();

        let mut nodes = self.write()?;
        for (id, handle, alive) in verdicts {
            let Some(node) = nodes.get_mut(&id) else {
                continue;
            };
            if node.handle != handle {
                continue;
            }
            if node.alive != alive {
                info!(
                    node_id = id,
                    "node is now {}",
                    if alive { "alive" } else { "down" }
                );
                node.alive = alive;
            }
        }

        Ok(())
    }

    pub fn alive_nodes(&self) -> Result<BTreeSet<NodeId>, ApiError> {
        Ok(self
            .read()?
            .values()
            .filter(|n| n.alive)
            .map(|n| n.node_id)
            .collect())
    }

    pub fn get(&self, node_id: NodeId) -> Result<Option<NodeRecord>, ApiError> {
        Ok(self.read()?.get(&node_id).cloned())
    }

    /// Call targets for `ids`, in the given order. Unknown ids are skipped.
    pub fn targets(&self, ids: &[NodeId]) -> Result<Vec<NodeTarget>, ApiError> {
        let nodes = self.read()?;
        Ok(ids
            .iter()
            .filter_map(|id| nodes.get(id).map(NodeRecord::target))
            .collect())
    }

    /// Snapshot ordered by node id.
    pub fn nodes(&self) -> Result<Vec<NodeRecord>, ApiError> {
        Ok(self.read()?.values().cloned().collect())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<NodeId, NodeRecord>>, ApiError> {
        self.nodes
            .read()
            .map_err(|e| ApiError::Any(anyhow!("failed to acquire nodes read lock: {}", e)))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, BTreeMap<NodeId, NodeRecord>>, ApiError> {
        self.nodes
            .write()
            .map_err(|e| ApiError::Any(anyhow!("failed to acquire nodes lock: {}", e)))
    }
}
