use std::{
    io,
    path::{Path, PathBuf},
};
use tokio::fs;

use crate::constants::{BLOB_DIR_NAME, META_FILE_EXT, TMP_DIR_NAME};

fn key_digest(key: &str) -> blake3::Hash {
    blake3::hash(key.as_bytes())
}

/// `<root>/blobs/<aa>/<bb>/<blake3(key)>`. Keys are hashed so that any
/// opaque path maps to a safe, fixed-length file name.
pub fn blob_path(root: &Path, key: &str) -> PathBuf {
    let digest = key_digest(key);
    let bytes = digest.as_bytes();
    root.join(BLOB_DIR_NAME)
        .join(format!("{:02x}", bytes[0]))
        .join(format!("{:02x}", bytes[1]))
        .join(digest.to_hex().as_str())
}

pub fn meta_path(root: &Path, key: &str) -> PathBuf {
    blob_path(root, key).with_extension(META_FILE_EXT)
}

pub fn tmp_path(root: &Path, upload_id: &str) -> PathBuf {
    root.join(TMP_DIR_NAME).join(upload_id)
}

pub async fn init_dirs(root: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(root.join(BLOB_DIR_NAME)).await?;
    fs::create_dir_all(root.join(TMP_DIR_NAME)).await?;

    Ok(())
}

pub async fn fsync_dir(dir: &Path) -> io::Result<()> {
    let dirf = fs::File::open(dir).await?;
    dirf.sync_all().await?;
    Ok(())
}

/// Removes a file, treating "already gone" as success.
pub async fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}
