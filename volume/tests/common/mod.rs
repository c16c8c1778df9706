#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use common::file_utils::{blob_path, init_dirs, meta_path};
use volume::fault_injection::FaultInjector;
use volume::state::{DurabilityLevel, VolumeState};

/// A storage node serving from a temp dir. It never registers anywhere; tests
/// talk to it directly the way the coordinator would.
pub struct TestNode {
    pub state: VolumeState,
    pub data_dir: TempDir,
    pub addr: SocketAddr,
    handle: JoinHandle<Result<()>>,
    shutdown_tx: watch::Sender<bool>,
}

impl TestNode {
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| {}).await
    }

    pub async fn start_with(configure: impl FnOnce(&mut VolumeState)) -> Result<Self> {
        let data_dir = TempDir::new()?;
        init_dirs(data_dir.path()).await?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let mut state = VolumeState {
            node_id: 1,
            data_root: Arc::new(data_dir.path().to_path_buf()),
            coordinator_addr: "127.0.0.1:1".to_string(),
            advertise_addr: addr.to_string(),
            max_size: common::constants::DEFAULT_MAX_SIZE,
            io_timeout: Duration::from_secs(5),
            fault_injector: Arc::new(FaultInjector::new()),
            durability_level: DurabilityLevel::OS,
        };
        configure(&mut state);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(volume::server::run(listener, state.clone(), shutdown_rx));

        Ok(TestNode {
            state,
            data_dir,
            addr,
            handle,
            shutdown_tx,
        })
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.state.fault_injector
    }

    pub fn blob_file(&self, key: &str) -> PathBuf {
        blob_path(self.data_dir.path(), key)
    }

    pub fn meta_file(&self, key: &str) -> PathBuf {
        meta_path(self.data_dir.path(), key)
    }

    pub async fn send(&self, request: &[u8]) -> Result<Vec<u8>> {
        let mut stream = TcpStream::connect(self.addr).await?;
        stream.write_all(request).await?;
        stream.shutdown().await?;

        let mut out = Vec::new();
        tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut out)).await??;
        Ok(out)
    }

    pub async fn send_text(&self, request: &[u8]) -> Result<String> {
        Ok(String::from_utf8(self.send(request).await?)?)
    }

    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
        Ok(())
    }
}

pub fn store_request(path: &str, data: &[u8]) -> Vec<u8> {
    let mut req = format!(
        "STORE {} {} {}\n",
        path,
        data.len(),
        common::checksum::checksum(data)
    )
    .into_bytes();
    req.extend_from_slice(data);
    req
}
