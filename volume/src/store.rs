//! On-disk layout of a storage node: one blob file per path plus a JSON
//! sidecar carrying the checksum accepted at STORE time.

use anyhow::anyhow;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use common::constants::TMP_DIR_NAME;
use common::error::ApiError;
use common::file_utils::{blob_path, fsync_dir, meta_path, remove_if_exists, tmp_path};
use common::time_utils::utc_now_ms;

use crate::state::DurabilityLevel;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BlobMeta {
    pub path: String,
    pub size: u64,
    pub checksum: u64,
    pub stored_ms: i64,
}

pub async fn conditional_sync_file(
    file: &mut File,
    durability: DurabilityLevel,
) -> Result<(), ApiError> {
    match durability {
        DurabilityLevel::Immediate => {
            file.sync_all().await?;
        }
        DurabilityLevel::OS => {
            // Skip sync, rely on OS
        }
    }
    Ok(())
}

pub async fn conditional_sync_dir(dir: &Path, durability: DurabilityLevel) -> Result<(), ApiError> {
    match durability {
        DurabilityLevel::Immediate => {
            fsync_dir(dir).await?;
        }
        DurabilityLevel::OS => {
            // Skip sync, rely on OS
        }
    }
    Ok(())
}

async fn write_tmp(
    root: &Path,
    bytes: &[u8],
    durability: DurabilityLevel,
) -> Result<std::path::PathBuf, ApiError> {
    let tmp = tmp_path(root, &Uuid::new_v4().to_string());
    let mut file = File::create(&tmp).await?;
    file.write_all(bytes).await?;
    file.flush().await?;
    conditional_sync_file(&mut file, durability).await?;
    Ok(tmp)
}

/// Writes the blob and its sidecar through the tmp dir, replacing any
/// previous copy of the same path. The sidecar goes last so a reader never
/// sees metadata for a blob that is not fully in place.
pub async fn put_blob(
    root: &Path,
    key: &str,
    data: &[u8],
    checksum: u64,
    durability: DurabilityLevel,
) -> Result<BlobMeta, ApiError> {
    let final_path = blob_path(root, key);
    let final_meta = meta_path(root, key);
    let final_dir = final_path
        .parent()
        .ok_or_else(|| ApiError::Any(anyhow!("blob path has no parent")))?;
    fs::create_dir_all(final_dir).await?;

    let meta = BlobMeta {
        path: key.to_string(),
        size: data.len() as u64,
        checksum,
        stored_ms: utc_now_ms(),
    };
    let meta_json = serde_json::to_vec(&meta).map_err(|e| ApiError::Any(e.into()))?;

    let tmp_blob = write_tmp(root, data, durability).await?;
    let tmp_meta = write_tmp(root, &meta_json, durability).await?;

    // Old sidecar first: a crash in between leaves a blob without metadata,
    // which reads as absent.
    remove_if_exists(&final_meta).await?;
    fs::rename(&tmp_blob, &final_path).await?;
    fs::rename(&tmp_meta, &final_meta).await?;

    conditional_sync_dir(final_dir, durability).await?;

    Ok(meta)
}

/// The stored copy of `key`, or `None` when this node has none.
pub async fn get_blob(root: &Path, key: &str) -> Result<Option<(BlobMeta, Bytes)>, ApiError> {
    let meta_bytes = match fs::read(meta_path(root, key)).await {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let meta: BlobMeta =
        serde_json::from_slice(&meta_bytes).map_err(|e| ApiError::Any(e.into()))?;

    // Two paths hashing to the same file would be a digest collision.
    if meta.path != key {
        return Ok(None);
    }

    let data = match fs::read(blob_path(root, key)).await {
        Ok(b) => b,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    Ok(Some((meta, Bytes::from(data))))
}

/// Removes blob and sidecar. Returns whether anything was there.
pub async fn delete_blob(root: &Path, key: &str) -> Result<bool, ApiError> {
    let had_meta = remove_if_exists(&meta_path(root, key)).await?;
    let had_blob = remove_if_exists(&blob_path(root, key)).await?;
    Ok(had_meta || had_blob)
}

/// Deletes files left in the tmp dir by writes that never completed.
pub async fn sweep_tmp(root: &Path) -> anyhow::Result<u64> {
    let dir = root.join(TMP_DIR_NAME);
    let mut removed = 0u64;

    let mut entries = match fs::read_dir(&dir).await {
        Ok(e) => e,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if remove_if_exists(&entry.path()).await? {
            debug!(path = %entry.path().display(), "removed stale tmp file");
            removed += 1;
        }
    }

    Ok(removed)
}
