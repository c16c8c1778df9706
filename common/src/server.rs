use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const ACCEPT_BACKOFF: Duration = Duration::from_millis(10);

/// Accept loop shared by the coordinator and the storage nodes. Every
/// connection runs on its own task; the loop exits once `shutdown` flips to
/// true or its sender is dropped.
pub async fn serve<F, Fut>(
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
    handler: F,
) -> anyhow::Result<()>
where
    F: Fn(TcpStream, SocketAddr) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    let handler = Arc::new(handler);
    let local_addr = listener.local_addr()?;

    loop {
        tokio::select! {
            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("accept failed: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                };
                let _ = stream.set_nodelay(true);
                let handler = handler.clone();
                tokio::spawn(async move {
                    if let Err(e) = handler(stream, peer).await {
                        debug!(%peer, "connection ended with error: {:#}", e);
                    }
                });
            }
            res = shutdown.changed() => {
                if res.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }

    info!("server on {} stopped", local_addr);

    Ok(())
}

/// Half-closes the write side, then drains whatever the peer is still sending
/// until it closes, for at most `drain_for`. Closing with unread input would
/// reset the connection and could discard a reply the peer has not read yet,
/// e.g. an early rejection of an upload whose payload is still in flight.
pub async fn linger_close<R, W>(reader: &mut R, writer: &mut W, drain_for: Duration)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let _ = writer.flush().await;
    let _ = writer.shutdown().await;
    let _ = timeout(drain_for, tokio::io::copy(reader, &mut tokio::io::sink())).await;
}
