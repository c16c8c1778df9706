use anyhow::anyhow;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use common::NodeId;
use common::error::ApiError;

/// Committed metadata for one stored object. Replaced wholesale by a newer
/// upload of the same path, never merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub path: String,
    pub replicas: Vec<NodeId>, // read preference order
    pub checksum: u64,
    pub size: u64,
}

impl FileEntry {
    pub fn primary(&self) -> Option<NodeId> {
        self.replicas.first().copied()
    }
}

/// In-memory path -> entry map. Volatile: lost on coordinator restart.
#[derive(Clone, Default)]
pub struct FileTable {
    inner: Arc<RwLock<BTreeMap<String, FileEntry>>>,
}

impl FileTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Result<Option<FileEntry>, ApiError> {
        let files = self
            .inner
            .read()
            .map_err(|e| ApiError::Any(anyhow!("failed to acquire files read lock: {}", e)))?;
        Ok(files.get(path).cloned())
    }

    /// Inserts or replaces, returning the previous entry.
    pub fn insert(&self, entry: FileEntry) -> Result<Option<FileEntry>, ApiError> {
        let mut files = self
            .inner
            .write()
            .map_err(|e| ApiError::Any(anyhow!("failed to acquire files lock: {}", e)))?;
        Ok(files.insert(entry.path.clone(), entry))
    }

    pub fn remove(&self, path: &str) -> Result<Option<FileEntry>, ApiError> {
        let mut files = self
            .inner
            .write()
            .map_err(|e| ApiError::Any(anyhow!("failed to acquire files lock: {}", e)))?;
        Ok(files.remove(path))
    }

    /// Paths in lexicographic order.
    pub fn paths(&self) -> Result<Vec<String>, ApiError> {
        let files = self
            .inner
            .read()
            .map_err(|e| ApiError::Any(anyhow!("failed to acquire files read lock: {}", e)))?;
        Ok(files.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, replicas: Vec<NodeId>, checksum: u64) -> FileEntry {
        FileEntry {
            path: path.to_string(),
            replicas,
            checksum,
            size: 1,
        }
    }

    #[test]
    fn test_insert_replaces_whole_entry() -> anyhow::Result<()> {
        let table = FileTable::new();
        assert!(table.insert(entry("/a", vec![1, 2], 10))?.is_none());

        let prev = table.insert(entry("/a", vec![3], 20))?.unwrap();
        assert_eq!(prev.replicas, vec![1, 2]);

        let cur = table.get("/a")?.unwrap();
        assert_eq!(cur.replicas, vec![3]);
        assert_eq!(cur.checksum, 20);
        assert_eq!(cur.primary(), Some(3));
        Ok(())
    }

    #[test]
    fn test_paths_sorted_and_remove() -> anyhow::Result<()> {
        let table = FileTable::new();
        for p in ["/c", "/a", "/b"] {
            table.insert(entry(p, vec![1], 0))?;
        }
        assert_eq!(table.paths()?, vec!["/a", "/b", "/c"]);

        assert!(table.remove("/b")?.is_some());
        assert!(table.remove("/b")?.is_none());
        assert_eq!(table.paths()?, vec!["/a", "/c"]);
        assert!(table.get("/b")?.is_none());
        Ok(())
    }
}
