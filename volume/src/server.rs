use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, warn};

use common::error::ApiError;
use common::protocol::{read_line, write_line, write_payload};
use common::schemas::{NodeRequest, OK};
use common::server::{linger_close, serve};

use crate::routes::{delete_handler, get_handler, store_handler};
use crate::state::VolumeState;

pub async fn run(
    listener: TcpListener,
    ctx: VolumeState,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    serve(listener, shutdown, move |stream, peer| {
        let ctx = ctx.clone();
        async move { handle_connection(ctx, stream, peer).await }
    })
    .await
}

pub async fn handle_connection(
    ctx: VolumeState,
    stream: TcpStream,
    peer: SocketAddr,
) -> anyhow::Result<()> {
    let (r, mut writer) = stream.into_split();
    let mut reader = BufReader::new(r);

    let res = tokio::time::timeout(ctx.io_timeout, dispatch(&ctx, &mut reader, &mut writer))
        .await
        .unwrap_or_else(|_| Err(ApiError::TransportFailure("request timed out".to_string())));

    if let Err(e) = &res {
        debug!(%peer, "request failed: {}", e);
        if let Err(write_err) = write_line(&mut writer, &e.to_reply()).await {
            warn!(%peer, "failed to send error reply: {}", write_err);
        }
    }

    linger_close(&mut reader, &mut writer, ctx.io_timeout).await;
    Ok(())
}

async fn dispatch<R, W>(ctx: &VolumeState, reader: &mut R, writer: &mut W) -> Result<(), ApiError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(line) = read_line(reader).await? else {
        return Ok(());
    };

    match NodeRequest::parse(&line)? {
        NodeRequest::Store {
            path,
            size,
            checksum,
        } => {
            store_handler(ctx, &path, size, checksum, reader).await?;
            write_line(writer, OK).await?;
        }
        NodeRequest::Get { path } => {
            let (meta, data) = get_handler(ctx, &path).await?;
            write_line(writer, &data.len().to_string()).await?;
            write_line(writer, &meta.checksum.to_string()).await?;
            write_payload(writer, &data).await?;
        }
        NodeRequest::Delete { path } => {
            delete_handler(ctx, &path).await?;
            write_line(writer, OK).await?;
        }
    }

    Ok(())
}
