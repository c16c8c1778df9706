use anyhow::anyhow;
use bytes::Bytes;
use tokio::io::AsyncRead;
use tracing::{Instrument, debug, error, info, warn};

use common::NodeId;
use common::addr_utils::{default_node_addr, sanitize_addr};
use common::checksum::checksum;
use common::error::ApiError;
use common::key_utils::validate_path;
use common::protocol::{read_payload, within};
use common::schemas::RecoveryNotice;

use crate::core::health::LivenessHandle;
use crate::core::meta::FileEntry;
use crate::core::node::NodeRecord;
use crate::core::op::{fetch, remove, store};
use crate::core::placement::choose_placement;
use crate::core::state::CoordinatorState;

// REGISTER <id> <token> [addr]
#[tracing::instrument(name = "coord.register", skip(ctx, token))]
pub fn register(
    ctx: &CoordinatorState,
    node_id: NodeId,
    token: String,
    addr: Option<String>,
) -> Result<NodeRecord, ApiError> {
    let addr = match addr {
        Some(a) => sanitize_addr(&a),
        None => default_node_addr(&ctx.node_host, ctx.node_base_port, node_id),
    }
    .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    ctx.registry.register(node_id, LivenessHandle::new(token), addr)
}

// UPLOAD <path>\n<size>\n<payload>
/// Buffers the payload, writes it to every placed node and commits the entry
/// if at least one node acknowledged. Returns the committed replicas in
/// placement order.
#[tracing::instrument(name = "coord.upload", skip(ctx, body))]
pub async fn upload<R>(
    ctx: &CoordinatorState,
    path: &str,
    body: &mut R,
    declared_size: u64,
) -> Result<Vec<NodeId>, ApiError>
where
    R: AsyncRead + Unpin,
{
    validate_path(path)?;
    if declared_size == 0 || declared_size > ctx.max_size {
        return Err(ApiError::InvalidSize);
    }

    // Each upload holds its whole payload in memory
    let _permit = ctx
        .inflight
        .acquire()
        .await
        .map_err(|e| ApiError::Any(anyhow!("failed to acquire inflight permit: {}", e)))?;

    let placed = {
        let _choose_placement = tracing::info_span!("choose_placement").entered();

        ctx.registry.refresh_liveness()?;
        let alive = ctx.registry.alive_nodes()?;
        choose_placement(
            ctx.placement,
            path,
            &alive,
            ctx.n_replicas,
            ctx.min_replicas,
        )?
    };

    // The inflight permit is held across this read.
    let data: Bytes = within(ctx.io_timeout, read_payload(body, declared_size))
        .instrument(tracing::info_span!("read_body", size = declared_size))
        .await?;
    let sum = checksum(&data);

    let targets = ctx.registry.targets(&placed)?;
    let results = store::store_all(&ctx.node_client, &targets, path, &data, sum)
        .instrument(tracing::info_span!("fan_out", replicas = targets.len()))
        .await;

    let acked: Vec<NodeId> = results
        .into_iter()
        .filter_map(|(id, res)| res.ok().map(|_| id))
        .collect();

    if acked.is_empty() {
        error!(placed = ?placed, "no node accepted the write");
        return Err(ApiError::WriteFailed);
    }
    if acked.len() < placed.len() {
        warn!(
            placed = ?placed,
            acked = ?acked,
            "committing with fewer replicas than placed"
        );
    }

    ctx.files.insert(FileEntry {
        path: path.to_string(),
        replicas: acked.clone(),
        checksum: sum,
        size: declared_size,
    })?;

    info!(replicas = ?acked, size = declared_size, checksum = sum, "stored");

    Ok(acked)
}

/// A verified copy, plus the notice to emit when it did not come from the
/// first replica.
#[derive(Debug, Clone)]
pub struct Download {
    pub data: Bytes,
    pub size: u64,
    pub checksum: u64,
    pub served_by: NodeId,
    pub recovery: Option<RecoveryNotice>,
}

// DOWNLOAD <path>
/// Walks the replica list in preference order, skipping nodes marked down and
/// moving on after any failed fetch. A copy that fails verification ends the
/// walk.
#[tracing::instrument(name = "coord.download", skip(ctx))]
pub async fn download(ctx: &CoordinatorState, path: &str) -> Result<Download, ApiError> {
    validate_path(path)?;
    ctx.registry.refresh_liveness()?;

    let entry = ctx.files.get(path)?.ok_or(ApiError::NotFound)?;
    let primary = entry.primary().ok_or(ApiError::AllReplicasUnavailable)?;

    for &node_id in &entry.replicas {
        let Some(node) = ctx.registry.get(node_id)? else {
            continue;
        };
        if !node.alive {
            debug!(node_id, "skipping replica on a node marked down");
            continue;
        }

        let fetched = match fetch::fetch(&ctx.node_client, &node.target(), path)
            .instrument(tracing::info_span!("fetch", node_id))
            .await
        {
            Ok(f) => f,
            Err(e) => {
                warn!(node_id, "fetch failed: {}", e);
                continue;
            }
        };

        let intact = fetched.size == entry.size
            && fetched.checksum == entry.checksum
            && checksum(&fetched.data) == entry.checksum;
        if !intact {
            error!(
                node_id,
                expected = entry.checksum,
                declared = fetched.checksum,
                "replica failed verification"
            );
            return Err(ApiError::IntegrityFailure);
        }

        let recovery = (node_id != primary).then_some(RecoveryNotice {
            failed: primary,
            used: node_id,
        });
        if let Some(notice) = &recovery {
            info!("{}", notice);
        }

        return Ok(Download {
            data: fetched.data,
            size: entry.size,
            checksum: entry.checksum,
            served_by: node_id,
            recovery,
        });
    }

    error!(replicas = ?entry.replicas, "no replica could serve the file");
    Err(ApiError::AllReplicasUnavailable)
}

// DELETE <path>
/// Sends the removal to every replica, reachable or not. One acknowledgement
/// is enough to drop the entry; copies left on unreachable nodes stay orphaned.
#[tracing::instrument(name = "coord.delete", skip(ctx))]
pub async fn delete(ctx: &CoordinatorState, path: &str) -> Result<(), ApiError> {
    validate_path(path)?;
    let entry = ctx.files.get(path)?.ok_or(ApiError::NotFound)?;

    ctx.registry.refresh_liveness()?;

    let targets = ctx.registry.targets(&entry.replicas)?;
    let results = remove::remove_all(&ctx.node_client, &targets, path)
        .instrument(tracing::info_span!("fan_out", replicas = targets.len()))
        .await;

    let acked = results.iter().filter(|(_, res)| res.is_ok()).count();
    if acked == 0 {
        error!(replicas = ?entry.replicas, "no replica acknowledged the delete");
        return Err(ApiError::DeleteFailed);
    }
    if acked < entry.replicas.len() {
        warn!(
            acked,
            replicas = entry.replicas.len(),
            "some replicas kept a stale copy"
        );
    }

    ctx.files.remove(path)?;
    info!("deleted");

    Ok(())
}

// LIST
pub fn list(ctx: &CoordinatorState) -> Result<Vec<String>, ApiError> {
    ctx.files.paths()
}

// NODES
#[tracing::instrument(name = "coord.nodes", skip(ctx))]
pub fn nodes(ctx: &CoordinatorState) -> Result<Vec<NodeRecord>, ApiError> {
    ctx.registry.refresh_liveness()?;
    ctx.registry.nodes()
}
