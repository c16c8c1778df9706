pub const MAX_KEY_LEN: usize = 2048;
pub const MAX_LINE_LEN: usize = 8 * 1024;

// 10 MiB
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

pub const NODE_BASE_PORT: u16 = 9001;
pub const DEFAULT_COORDINATOR_ADDR: &str = "127.0.0.1:9000";
pub const DEFAULT_NODE_HOST: &str = "127.0.0.1";

pub const BLOB_DIR_NAME: &str = "blobs";
pub const TMP_DIR_NAME: &str = "tmp";
pub const META_FILE_EXT: &str = "meta";

pub const NO_FILES_STORED: &str = "No files stored";
pub const NO_NODES_REGISTERED: &str = "No nodes registered";
