#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use rand::Rng;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use client::Client;
use common::NodeId;
use common::file_utils::{blob_path, init_dirs};
use coord::command::serve::ServeArgs;
use coord::core::health::ManualProbe;
use coord::core::state::CoordinatorState;
use volume::fault_injection::FaultInjector;
use volume::join::join_cluster;
use volume::state::{DurabilityLevel, VolumeState};

pub struct TestServer {
    pub handle: JoinHandle<Result<()>>,
    pub shutdown_tx: watch::Sender<bool>,
    pub addr: SocketAddr,
}

impl TestServer {
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(true);
        // Wait for the accept loop to exit so the listener is closed.
        let _ = self.handle.await;
        Ok(())
    }
}

pub struct TestCoordinator {
    pub server: TestServer,
    pub state: CoordinatorState,
    pub probe: Arc<ManualProbe>,
}

impl TestCoordinator {
    pub async fn new() -> Result<Self> {
        Self::with_flags(&[]).await
    }

    /// Starts a coordinator configured from `coord serve` flags. Liveness is
    /// driven by a `ManualProbe` owned by the test.
    pub async fn with_flags(flags: &[&str]) -> Result<Self> {
        let mut argv = vec!["serve"];
        for (flag, value) in [("--node-timeout-ms", "1000"), ("--transfer-timeout-ms", "5000")] {
            if !flags.contains(&flag) {
                argv.extend([flag, value]);
            }
        }
        argv.extend_from_slice(flags);
        let args = ServeArgs::try_parse_from(argv)?;

        let probe = Arc::new(ManualProbe::new());
        let state = args.build_state(probe.clone())?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(coord::core::server::run(
            listener,
            state.clone(),
            shutdown_rx,
        ));

        Ok(TestCoordinator {
            server: TestServer {
                handle,
                shutdown_tx,
                addr,
            },
            state,
            probe,
        })
    }

    pub fn addr(&self) -> String {
        self.server.addr.to_string()
    }

    pub fn client(&self) -> Client {
        Client::new(self.addr(), Duration::from_secs(10))
    }

    /// Forces the next liveness refresh to report `node_id` down.
    pub fn kill_liveness(&self, node_id: NodeId) {
        self.probe.mark_down(node_id);
    }

    pub fn revive_liveness(&self, node_id: NodeId) {
        self.probe.mark_up(node_id);
    }

    pub async fn shutdown(self) -> Result<()> {
        self.server.shutdown().await
    }
}

pub struct TestVolume {
    pub server: Option<TestServer>,
    pub state: VolumeState,
    pub data_dir: TempDir,
    pub addr: SocketAddr,
}

impl TestVolume {
    /// Binds, registers with the coordinator and starts serving.
    pub async fn start(coord: &TestCoordinator, node_id: NodeId) -> Result<Self> {
        let data_dir = TempDir::new()?;
        init_dirs(data_dir.path()).await?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let state = VolumeState {
            node_id,
            data_root: Arc::new(data_dir.path().to_path_buf()),
            coordinator_addr: coord.addr(),
            advertise_addr: addr.to_string(),
            max_size: common::constants::DEFAULT_MAX_SIZE,
            io_timeout: Duration::from_secs(10),
            fault_injector: Arc::new(FaultInjector::new()),
            durability_level: DurabilityLevel::OS,
        };

        join_cluster(&state).await?;

        let mut vol = TestVolume {
            server: None,
            state,
            data_dir,
            addr,
        };
        vol.serve(listener);
        Ok(vol)
    }

    fn serve(&mut self, listener: TcpListener) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(volume::server::run(
            listener,
            self.state.clone(),
            shutdown_rx,
        ));
        self.server = Some(TestServer {
            handle,
            shutdown_tx,
            addr: self.addr,
        });
    }

    pub fn node_id(&self) -> NodeId {
        self.state.node_id
    }

    pub fn faults(&self) -> &FaultInjector {
        &self.state.fault_injector
    }

    /// Stops accepting connections. The coordinator is not told.
    pub async fn stop(&mut self) -> Result<()> {
        if let Some(server) = self.server.take() {
            server.shutdown().await?;
        }
        Ok(())
    }

    /// Serves again on the same address and re-registers.
    pub async fn restart(&mut self) -> Result<()> {
        self.stop().await?;
        let listener = TcpListener::bind(self.addr).await?;
        join_cluster(&self.state).await?;
        self.serve(listener);
        Ok(())
    }

    pub fn blob_file(&self, key: &str) -> PathBuf {
        blob_path(self.data_dir.path(), key)
    }

    pub fn has_blob(&self, key: &str) -> bool {
        self.blob_file(key).exists()
    }

    pub async fn shutdown(mut self) -> Result<()> {
        self.stop().await
    }
}

/// Coordinator plus `n` volumes with ids 1..=n.
pub async fn cluster(flags: &[&str], n: NodeId) -> Result<(TestCoordinator, Vec<TestVolume>)> {
    let coord = TestCoordinator::with_flags(flags).await?;
    let mut volumes = Vec::new();
    for id in 1..=n {
        volumes.push(TestVolume::start(&coord, id).await?);
    }
    Ok((coord, volumes))
}

pub async fn shutdown_all(coord: TestCoordinator, volumes: Vec<TestVolume>) -> Result<()> {
    for v in volumes {
        v.shutdown().await?;
    }
    coord.shutdown().await
}

/// Sends raw bytes as one request and returns everything the server wrote
/// back before closing.
pub async fn raw_exchange(addr: &str, request: &[u8]) -> Result<Vec<u8>> {
    let mut stream = TcpStream::connect(addr).await?;
    stream.write_all(request).await?;
    stream.shutdown().await?;

    let mut out = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), stream.read_to_end(&mut out)).await??;
    Ok(out)
}

pub async fn raw_text(addr: &str, request: &[u8]) -> Result<String> {
    Ok(String::from_utf8(raw_exchange(addr, request).await?)?)
}

pub async fn wait_until<F, Fut>(timeout_ms: u64, mut check_fn: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool>>,
{
    let start = Instant::now();
    let timeout_duration = Duration::from_millis(timeout_ms);

    loop {
        if check_fn().await? {
            return Ok(());
        }

        if start.elapsed() > timeout_duration {
            anyhow::bail!("wait_until timed out after {}ms", timeout_ms);
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

pub fn generate_random_bytes(size: usize) -> Vec<u8> {
    let mut buf = vec![0u8; size];
    rand::rng().fill(&mut buf[..]);
    buf
}
