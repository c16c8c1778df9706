use anyhow::anyhow;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use common::NodeId;
use common::addr_utils::default_node_addr;
use common::constants::{
    DEFAULT_COORDINATOR_ADDR, DEFAULT_MAX_SIZE, DEFAULT_NODE_HOST, NODE_BASE_PORT,
};
use common::file_utils::init_dirs;
use common::telemetry::init_telemetry;

use volume::fault_injection::FaultInjector;
use volume::join::join_cluster;
use volume::server::run;
use volume::state::{DurabilityLevel, VolumeState};
use volume::store::sweep_tmp;

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    /// Node id (>= 1)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
    node_id: NodeId,
    /// Address to listen on (default: 127.0.0.1:<9001 + node id>)
    #[arg(long)]
    listen: Option<String>,
    /// Address the coordinator should dial (default: the listen address)
    #[arg(long)]
    advertise: Option<String>,
    /// Data directory (default: ./storage/node<id>)
    #[arg(long)]
    data: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_COORDINATOR_ADDR)]
    coordinator: String,
    #[arg(long, default_value_t = DEFAULT_MAX_SIZE)]
    max_size: u64,
    #[arg(long, default_value_t = 30000)]
    io_timeout_ms: u64,
    #[arg(long, value_enum, default_value_t = DurabilityLevel::Immediate)]
    durability: DurabilityLevel,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry("volume");

    let args = Args::parse();

    let listen = match args.listen {
        Some(l) => l,
        None => default_node_addr(DEFAULT_NODE_HOST, NODE_BASE_PORT, args.node_id)?,
    };
    let data = args
        .data
        .unwrap_or_else(|| PathBuf::from(format!("storage/node{}", args.node_id)));

    init_dirs(&data).await?;
    let swept = sweep_tmp(&data).await?;
    if swept > 0 {
        info!(swept, "removed leftover tmp files");
    }

    // Bind before registering so the coordinator can reach us right away.
    let listener = TcpListener::bind(&listen)
        .await
        .map_err(|e| anyhow!("bind failed on {}: {}", listen, e))?;

    let state = VolumeState {
        node_id: args.node_id,
        data_root: Arc::new(data),
        coordinator_addr: args.coordinator,
        advertise_addr: args.advertise.unwrap_or_else(|| listen.clone()),
        max_size: args.max_size,
        io_timeout: Duration::from_millis(args.io_timeout_ms),
        fault_injector: Arc::new(FaultInjector::new()),
        durability_level: args.durability,
    };

    join_cluster(&state).await?;

    info!(node_id = state.node_id, "listening on {}", listen);

    let (shutdown_tx, shutdown_rx) = watch::channel::<bool>(false);
    let server = tokio::spawn(run(listener, state, shutdown_rx));

    // Graceful shutdown: ctrl+c
    tokio::signal::ctrl_c().await?;
    let _ = shutdown_tx.send(true);
    server.await??;

    Ok(())
}
