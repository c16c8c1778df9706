use anyhow::{anyhow, bail};
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::info;

use common::protocol::{expect_line, write_line};
use common::schemas::{Request, error_reason, parse_registered};

use crate::state::VolumeState;

/// Announces this node to the coordinator. The liveness token is our PID,
/// which the coordinator probes before every operation.
pub async fn join_cluster(state: &VolumeState) -> anyhow::Result<()> {
    let req = Request::Register {
        node_id: state.node_id,
        token: std::process::id().to_string(),
        addr: Some(state.advertise_addr.clone()),
    };

    let exchange = async {
        let stream = TcpStream::connect(&state.coordinator_addr).await?;
        let (r, mut w) = stream.into_split();
        let mut reader = BufReader::new(r);

        write_line(&mut w, &req.encode()).await?;
        let line = expect_line(&mut reader).await?;
        anyhow::Ok(line)
    };

    let line = timeout(state.io_timeout, exchange)
        .await
        .map_err(|_| anyhow!("registration with {} timed out", state.coordinator_addr))?
        .map_err(|e| anyhow!("failed to reach coordinator {}: {}", state.coordinator_addr, e))?;

    if let Some(reason) = error_reason(&line) {
        bail!("coordinator refused registration: {}", reason);
    }
    let acked = parse_registered(&line)?;
    if acked != state.node_id {
        bail!("coordinator registered node {} instead of {}", acked, state.node_id);
    }

    info!(
        node_id = state.node_id,
        addr = %state.advertise_addr,
        "registered with coordinator {}",
        state.coordinator_addr
    );

    Ok(())
}
