use std::net::SocketAddr;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, warn};

use common::constants::{NO_FILES_STORED, NO_NODES_REGISTERED};
use common::error::{ApiError, ProtocolError};
use common::protocol::{expect_line, parse_u64, read_line, within, write_line, write_payload};
use common::schemas::{DELETED, DataHeader, Request, registered_reply, stored_reply};
use common::server::{linger_close, serve};

use crate::core::routes;
use crate::core::state::CoordinatorState;

/// Runs the coordinator accept loop until `shutdown` flips.
pub async fn run(
    listener: TcpListener,
    ctx: CoordinatorState,
    shutdown: watch::Receiver<bool>,
) -> anyhow::Result<()> {
    serve(listener, shutdown, move |stream, peer| {
        let ctx = ctx.clone();
        async move { handle_connection(ctx, stream, peer).await }
    })
    .await
}

/// One command per connection: read it, answer it, close.
pub async fn handle_connection(
    ctx: CoordinatorState,
    stream: TcpStream,
    peer: SocketAddr,
) -> anyhow::Result<()> {
    let (r, mut writer) = stream.into_split();
    let mut reader = BufReader::new(r);

    let res = dispatch(&ctx, &mut reader, &mut writer).await;
    if let Err(e) = &res {
        debug!(%peer, "request failed: {}", e);
        if let Err(write_err) = write_line(&mut writer, &e.to_reply()).await {
            warn!(%peer, "failed to send error reply: {}", write_err);
        }
    }

    linger_close(&mut reader, &mut writer, ctx.io_timeout).await;
    Ok(())
}

async fn dispatch<R, W>(
    ctx: &CoordinatorState,
    reader: &mut R,
    writer: &mut W,
) -> Result<(), ApiError>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let Some(line) = within(ctx.io_timeout, read_line(reader)).await? else {
        // Connected and left without a command.
        return Ok(());
    };

    match Request::parse(&line)? {
        Request::Register {
            node_id,
            token,
            addr,
        } => {
            let record = routes::register(ctx, node_id, token, addr)?;
            write_line(writer, &registered_reply(record.node_id)).await?;
        }
        Request::Upload { path } => {
            let size = within(ctx.io_timeout, read_upload_size(reader))
                .await
                .map_err(|e| match e {
                    ProtocolError::Malformed(_) => ApiError::InvalidSize,
                    other => other.into(),
                })?;
            let stored = routes::upload(ctx, &path, reader, size).await?;
            write_line(writer, &stored_reply(&stored)).await?;
        }
        Request::Download { path } => {
            let dl = routes::download(ctx, &path).await?;
            debug!(path = %path, served_by = dl.served_by, size = dl.size, "download served");
            if let Some(notice) = &dl.recovery {
                write_line(writer, &notice.to_string()).await?;
            }
            let header = DataHeader {
                size: dl.size,
                checksum: dl.checksum,
            };
            write_line(writer, &header.to_string()).await?;
            write_payload(writer, &dl.data).await?;
        }
        Request::List => {
            let paths = routes::list(ctx)?;
            if paths.is_empty() {
                write_line(writer, NO_FILES_STORED).await?;
            }
            for p in paths {
                write_line(writer, &p).await?;
            }
        }
        Request::Delete { path } => {
            routes::delete(ctx, &path).await?;
            write_line(writer, DELETED).await?;
        }
        Request::Nodes => {
            let nodes = routes::nodes(ctx)?;
            if nodes.is_empty() {
                write_line(writer, NO_NODES_REGISTERED).await?;
            }
            for n in nodes {
                write_line(writer, &n.status_line().to_string()).await?;
            }
        }
    }

    Ok(())
}

/// The size line of an UPLOAD. Anything that is not a plain decimal is an
/// invalid size rather than a malformed command.
async fn read_upload_size<R>(reader: &mut R) -> Result<u64, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let line = expect_line(reader).await?;
    parse_u64(&line, "size")
}
