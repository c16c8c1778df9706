use bytes::{Bytes, BytesMut};
use tokio::io::AsyncRead;
use tracing::{info, warn};

use common::checksum::verify;
use common::error::ApiError;
use common::protocol::read_payload;

use crate::state::VolumeState;
use crate::store::{BlobMeta, delete_blob, get_blob, put_blob};

// STORE <path> <size> <checksum>\n<payload>
/// Reads the payload, checks it against the announced checksum and writes
/// it to disk.
#[tracing::instrument(name = "volume.store", skip(ctx, body), fields(node_id = ctx.node_id))]
pub async fn store_handler<R>(
    ctx: &VolumeState,
    path: &str,
    size: u64,
    checksum: u64,
    body: &mut R,
) -> Result<BlobMeta, ApiError>
where
    R: AsyncRead + Unpin,
{
    ctx.fault_injector.apply_latency().await;

    if size == 0 || size > ctx.max_size {
        return Err(ApiError::InvalidSize);
    }

    let data = read_payload(body, size).await?;

    if ctx.fault_injector.should_fail_store() {
        return Err(ApiError::Any(anyhow::anyhow!("Fault injection: store failed")));
    }

    if !verify(&data, checksum) {
        warn!("payload does not match announced checksum");
        return Err(ApiError::IntegrityFailure);
    }

    let meta = put_blob(&ctx.data_root, path, &data, checksum, ctx.durability_level).await?;
    info!(size, checksum, "stored");

    Ok(meta)
}

// GET <path>
/// Returns the stored bytes with the checksum recorded at STORE time.
#[tracing::instrument(name = "volume.get", skip(ctx), fields(node_id = ctx.node_id))]
pub async fn get_handler(ctx: &VolumeState, path: &str) -> Result<(BlobMeta, Bytes), ApiError> {
    ctx.fault_injector.apply_latency().await;

    if ctx.fault_injector.should_fail_get() {
        return Err(ApiError::Any(anyhow::anyhow!("Fault injection: get failed")));
    }

    let (meta, data) = get_blob(&ctx.data_root, path)
        .await?
        .ok_or(ApiError::NotFound)?;

    if ctx.fault_injector.should_corrupt_get() && !data.is_empty() {
        let mut damaged = BytesMut::from(&data[..]);
        damaged[0] ^= 0xff;
        return Ok((meta, damaged.freeze()));
    }

    Ok((meta, data))
}

// DELETE <path>
/// Absent files are not an error.
#[tracing::instrument(name = "volume.delete", skip(ctx), fields(node_id = ctx.node_id))]
pub async fn delete_handler(ctx: &VolumeState, path: &str) -> Result<(), ApiError> {
    ctx.fault_injector.apply_latency().await;

    if ctx.fault_injector.should_fail_delete() {
        return Err(ApiError::Any(anyhow::anyhow!("Fault injection: delete failed")));
    }

    if delete_blob(&ctx.data_root, path).await? {
        info!("deleted");
    }

    Ok(())
}
