use anyhow::{anyhow, bail};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, watch};
use tracing::info;

use common::constants::{DEFAULT_MAX_SIZE, DEFAULT_NODE_HOST, NODE_BASE_PORT};

use crate::core::health::{AssumeAlive, LivenessProbe, ProcessProbe};
use crate::core::meta::FileTable;
use crate::core::node::NodeRegistry;
use crate::core::op::NodeClient;
use crate::core::placement::PlacementStrategy;
use crate::core::server::run;
use crate::core::state::CoordinatorState;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LivenessMode {
    /// Registration token is a PID on this host
    Process,
    /// Trust every registered node
    AssumeAlive,
}

#[derive(Parser, Debug, Clone)]
pub struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "0.0.0.0:9000")]
    pub listen: String,

    /// Target number of replicas per file
    #[arg(long, default_value_t = 2)]
    pub replicas: usize,

    /// Fewest alive nodes an upload accepts
    #[arg(long, default_value_t = 1)]
    pub min_replicas: usize,

    /// Max allowed file size in bytes (default: 10 MiB)
    #[arg(long, default_value_t = DEFAULT_MAX_SIZE)]
    pub max_size: u64,

    /// Max concurrent uploads
    #[arg(long, default_value_t = 4)]
    pub max_inflight: usize,

    /// Connect timeout towards storage nodes (milliseconds)
    #[arg(long, default_value_t = 5000)]
    pub node_timeout_ms: u64,

    /// Whole-exchange timeout towards storage nodes (milliseconds)
    #[arg(long, default_value_t = 30000)]
    pub transfer_timeout_ms: u64,

    /// Per-read timeout on client connections (milliseconds)
    #[arg(long, default_value_t = 30000)]
    pub io_timeout_ms: u64,

    #[arg(long, value_enum, default_value_t = PlacementStrategy::Ordered)]
    pub placement: PlacementStrategy,

    #[arg(long, value_enum, default_value_t = LivenessMode::Process)]
    pub liveness: LivenessMode,

    /// Host used for nodes that register without an address
    #[arg(long, default_value = DEFAULT_NODE_HOST)]
    pub node_host: String,

    /// Node N listens on base port + N unless it says otherwise
    #[arg(long, default_value_t = NODE_BASE_PORT)]
    pub node_base_port: u16,
}

impl ServeArgs {
    pub fn build_state(&self, probe: Arc<dyn LivenessProbe>) -> anyhow::Result<CoordinatorState> {
        if self.replicas == 0 {
            bail!("--replicas must be at least 1");
        }
        if self.min_replicas > self.replicas {
            bail!(
                "--min-replicas ({}) cannot exceed --replicas ({})",
                self.min_replicas,
                self.replicas
            );
        }
        if self.max_inflight == 0 {
            bail!("--max-inflight must be at least 1");
        }
        if self.io_timeout_ms == 0 {
            bail!("--io-timeout-ms must be at least 1");
        }

        Ok(CoordinatorState {
            registry: NodeRegistry::new(probe),
            files: FileTable::new(),
            node_client: NodeClient {
                connect_timeout: Duration::from_millis(self.node_timeout_ms),
                transfer_timeout: Duration::from_millis(self.transfer_timeout_ms),
                max_payload: self.max_size,
            },
            inflight: Arc::new(Semaphore::new(self.max_inflight)),
            max_size: self.max_size,
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            n_replicas: self.replicas,
            min_replicas: self.min_replicas,
            placement: self.placement,
            node_host: self.node_host.clone(),
            node_base_port: self.node_base_port,
        })
    }

    fn probe(&self) -> Arc<dyn LivenessProbe> {
        match self.liveness {
            LivenessMode::Process => Arc::new(ProcessProbe),
            LivenessMode::AssumeAlive => Arc::new(AssumeAlive),
        }
    }
}

pub async fn serve(serve_args: ServeArgs) -> anyhow::Result<()> {
    let state = serve_args.build_state(serve_args.probe())?;

    let listener = TcpListener::bind(&serve_args.listen)
        .await
        .map_err(|e| anyhow!("failed to bind {}: {}", serve_args.listen, e))?;

    info!(
        replicas = serve_args.replicas,
        min_replicas = serve_args.min_replicas,
        placement = ?serve_args.placement,
        liveness = ?serve_args.liveness,
        "listening on {}",
        listener.local_addr()?
    );

    let (shutdown_tx, shutdown_rx) = watch::channel::<bool>(false);
    let server = tokio::spawn(run(listener, state, shutdown_rx));

    // Graceful shutdown: ctrl+c
    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    let _ = shutdown_tx.send(true);
    server.await??;

    Ok(())
}
