use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

use client::Client;
use common::constants::DEFAULT_COORDINATOR_ADDR;
use common::telemetry::init_telemetry_with_level;

#[derive(Parser, Debug, Clone)]
#[command(version, about)]
struct Args {
    /// Coordinator address
    #[arg(long, default_value = DEFAULT_COORDINATOR_ADDR)]
    coordinator: String,

    /// Per-command timeout (milliseconds)
    #[arg(long, default_value_t = 30000)]
    timeout_ms: u64,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand, Debug, Clone)]
enum Cmd {
    /// Store a local file under a path
    Upload { local: PathBuf, path: String },
    /// Fetch a stored path into a local file
    Download { path: String, local: PathBuf },
    /// List stored paths
    List,
    /// Remove a stored path
    Delete { path: String },
    /// Show registered storage nodes
    Nodes,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_telemetry_with_level("client", "warn");

    let args = Args::parse();
    let client = Client::new(args.coordinator, Duration::from_millis(args.timeout_ms));

    match args.cmd {
        Cmd::Upload { local, path } => {
            let data = fs::read(&local)
                .await
                .with_context(|| format!("cannot read local file {}", local.display()))?;
            let nodes = client.upload(&path, &data).await.context("upload failed")?;
            let nodes: Vec<String> = nodes.iter().map(|n| n.to_string()).collect();
            println!("File uploaded successfully: {}", path);
            println!("Stored on nodes: {}", nodes.join(" "));
        }
        Cmd::Download { path, local } => {
            let dl = client.download(&path).await.context("download failed")?;
            if let Some(notice) = &dl.recovery {
                println!("{}", notice);
            }
            if let Some(parent) = local.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent).await?;
            }
            fs::write(&local, &dl.data)
                .await
                .with_context(|| format!("cannot create local file {}", local.display()))?;
            println!(
                "File downloaded successfully: {} ({} bytes)",
                local.display(),
                dl.size
            );
        }
        Cmd::List => {
            let paths = client.list().await.context("list failed")?;
            if paths.is_empty() {
                println!("No files stored");
            }
            for p in paths {
                println!("{}", p);
            }
        }
        Cmd::Delete { path } => {
            client.delete(&path).await.context("delete failed")?;
            println!("File deleted: {}", path);
        }
        Cmd::Nodes => {
            let nodes = client.nodes().await.context("nodes failed")?;
            if nodes.is_empty() {
                println!("No nodes registered");
            }
            for n in nodes {
                println!("{}", n);
            }
        }
    }

    Ok(())
}
