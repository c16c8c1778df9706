use blake3::Hasher;
use std::collections::BTreeSet;

use common::NodeId;
use common::error::ApiError;

const N_TOP_BYTES_FOR_SCORE: usize = 16;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum PlacementStrategy {
    /// Lowest node ids first.
    #[default]
    Ordered,
    /// Highest-random-weight hashing of (path, node id).
    Rendezvous,
}

/// Ranks nodes for `key` by descending blake3(key || node_id) score.
pub fn rank_nodes(key: &str, nodes: &[NodeId]) -> Vec<NodeId> {
    let mut scored: Vec<(u128, NodeId)> = nodes
        .iter()
        .map(|n| {
            let mut h = Hasher::new();
            h.update(key.as_bytes());
            h.update(&n.to_be_bytes());

            let hash = h.finalize();
            let mut score_bytes = [0u8; N_TOP_BYTES_FOR_SCORE];
            score_bytes.copy_from_slice(&hash.as_bytes()[0..N_TOP_BYTES_FOR_SCORE]);

            (u128::from_be_bytes(score_bytes), *n)
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    scored.into_iter().map(|(_, n)| n).collect()
}

/// Picks up to `n_replicas` nodes out of `alive`. Fewer is fine as long as at
/// least `min_replicas` are available.
pub fn choose_placement(
    strategy: PlacementStrategy,
    key: &str,
    alive: &BTreeSet<NodeId>,
    n_replicas: usize,
    min_replicas: usize,
) -> Result<Vec<NodeId>, ApiError> {
    let required = min_replicas.max(1);
    if alive.len() < required {
        return Err(ApiError::InsufficientReplicas {
            required,
            alive: alive.len(),
        });
    }

    let candidates: Vec<NodeId> = alive.iter().copied().collect();
    let ranked = match strategy {
        PlacementStrategy::Ordered => candidates,
        PlacementStrategy::Rendezvous => rank_nodes(key, &candidates),
    };

    Ok(ranked.into_iter().take(n_replicas.max(1)).collect())
}
