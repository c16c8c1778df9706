//! Client side of the coordinator protocol. One connection per command.

use bytes::Bytes;
use std::io;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;
use tracing::debug;

use common::NodeId;
use common::checksum::verify;
use common::constants::{DEFAULT_MAX_SIZE, NO_FILES_STORED, NO_NODES_REGISTERED};
use common::error::ProtocolError;
use common::key_utils::validate_path;
use common::protocol::{expect_line, read_line, read_payload, write_line, write_payload};
use common::schemas::{
    DELETED, DataHeader, NodeStatusLine, RecoveryNotice, Request, error_reason, parse_stored,
};

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("{0}")]
    Server(String),
    #[error("checksum mismatch - file may be corrupted")]
    ChecksumMismatch,
    #[error("request timed out")]
    Timeout,
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A downloaded file, already verified against its checksum.
#[derive(Debug, Clone)]
pub struct Downloaded {
    pub data: Bytes,
    pub size: u64,
    pub checksum: u64,
    pub recovery: Option<RecoveryNotice>,
}

#[derive(Debug, Clone)]
pub struct Client {
    coordinator: String,
    timeout: Duration,
    max_size: u64,
}

type Conn = (BufReader<OwnedReadHalf>, OwnedWriteHalf);

fn checked_path(path: &str) -> Result<String, ClientError> {
    validate_path(path).map_err(ProtocolError::from)?;
    Ok(path.to_string())
}

impl Client {
    pub fn new(coordinator: impl Into<String>, timeout: Duration) -> Self {
        Self {
            coordinator: coordinator.into(),
            timeout,
            max_size: DEFAULT_MAX_SIZE,
        }
    }

    /// Largest payload accepted from a download.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    async fn exchange<T, F, Fut>(&self, request: &Request, f: F) -> Result<T, ClientError>
    where
        F: FnOnce(Conn) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let line = request.encode();
        let work = async {
            let stream = TcpStream::connect(&self.coordinator).await?;
            let _ = stream.set_nodelay(true);
            let (r, mut w) = stream.into_split();
            write_line(&mut w, &line).await?;
            f((BufReader::new(r), w)).await
        };

        debug!(coordinator = %self.coordinator, "{}", line);
        timeout(self.timeout, work)
            .await
            .map_err(|_| ClientError::Timeout)?
    }

    /// Uploads `data` under `path` and returns the nodes holding it.
    pub async fn upload(&self, path: &str, data: &[u8]) -> Result<Vec<NodeId>, ClientError> {
        let req = Request::Upload {
            path: checked_path(path)?,
        };
        self.exchange(&req, |(mut reader, mut writer)| async move {
            write_line(&mut writer, &data.len().to_string()).await?;
            write_payload(&mut writer, data).await?;

            let line = expect_line(&mut reader).await?;
            if let Some(reason) = error_reason(&line) {
                return Err(ClientError::Server(reason.to_string()));
            }
            Ok(parse_stored(&line)?)
        })
        .await
    }

    pub async fn download(&self, path: &str) -> Result<Downloaded, ClientError> {
        let req = Request::Download {
            path: checked_path(path)?,
        };
        let max_size = self.max_size;
        self.exchange(&req, |(mut reader, _writer)| async move {
            let mut line = expect_line(&mut reader).await?;
            let recovery = RecoveryNotice::parse(&line);
            if recovery.is_some() {
                line = expect_line(&mut reader).await?;
            }
            if let Some(reason) = error_reason(&line) {
                return Err(ClientError::Server(reason.to_string()));
            }

            let header = DataHeader::parse(&line)?;
            if header.size > max_size {
                return Err(ProtocolError::Malformed(format!(
                    "announced size {} exceeds limit {}",
                    header.size, max_size
                ))
                .into());
            }
            let data = read_payload(&mut reader, header.size).await?;
            if !verify(&data, header.checksum) {
                return Err(ClientError::ChecksumMismatch);
            }

            Ok(Downloaded {
                data,
                size: header.size,
                checksum: header.checksum,
                recovery,
            })
        })
        .await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ClientError> {
        let req = Request::Delete {
            path: checked_path(path)?,
        };
        self.exchange(&req, |(mut reader, _writer)| async move {
            let line = expect_line(&mut reader).await?;
            if let Some(reason) = error_reason(&line) {
                return Err(ClientError::Server(reason.to_string()));
            }
            if line.trim() != DELETED {
                return Err(ProtocolError::Malformed(format!("unexpected reply {:?}", line)).into());
            }
            Ok(())
        })
        .await
    }

    /// Stored paths in lexicographic order.
    pub async fn list(&self) -> Result<Vec<String>, ClientError> {
        let lines = self.read_listing(&Request::List).await?;
        if matches!(lines.as_slice(), [only] if only == NO_FILES_STORED) {
            return Ok(Vec::new());
        }
        Ok(lines)
    }

    pub async fn nodes(&self) -> Result<Vec<NodeStatusLine>, ClientError> {
        let lines = self.read_listing(&Request::Nodes).await?;
        if matches!(lines.as_slice(), [only] if only == NO_NODES_REGISTERED) {
            return Ok(Vec::new());
        }
        lines
            .iter()
            .map(|l| NodeStatusLine::parse(l).map_err(ClientError::from))
            .collect()
    }

    async fn read_listing(&self, req: &Request) -> Result<Vec<String>, ClientError> {
        self.exchange(req, |(mut reader, _writer)| async move {
            let mut lines = Vec::new();
            while let Some(line) = read_line(&mut reader).await? {
                if lines.is_empty() {
                    if let Some(reason) = error_reason(&line) {
                        return Err(ClientError::Server(reason.to_string()));
                    }
                }
                lines.push(line);
            }
            Ok(lines)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Accepts one connection, reads the command line plus `extra` bytes, and
    /// answers with `reply`. Returns the address and the request it saw.
    async fn fake_coordinator(
        reply: &'static [u8],
        extra: usize,
    ) -> anyhow::Result<(String, tokio::task::JoinHandle<anyhow::Result<String>>)> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?.to_string();
        let handle = tokio::spawn(async move {
            let (stream, _) = listener.accept().await?;
            let (r, mut w) = stream.into_split();
            let mut reader = BufReader::new(r);
            let mut seen = expect_line(&mut reader).await?;
            if extra > 0 {
                let mut buf = vec![0u8; extra];
                reader.read_exact(&mut buf).await?;
                seen.push('\n');
                seen.push_str(&String::from_utf8_lossy(&buf));
            }
            w.write_all(reply).await?;
            w.shutdown().await?;
            Ok::<_, anyhow::Error>(seen)
        });
        Ok((addr, handle))
    }

    fn client(addr: String) -> Client {
        Client::new(addr, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_upload_sends_size_and_payload() -> anyhow::Result<()> {
        let (addr, server) = fake_coordinator(b"STORED 1 3\n", 7).await?;
        let stored = client(addr).upload("/a.txt", b"hello").await?;
        assert_eq!(stored, vec![1, 3]);
        assert_eq!(server.await??, "UPLOAD /a.txt\n5\nhello");
        Ok(())
    }

    #[tokio::test]
    async fn test_download_with_recovery_notice() -> anyhow::Result<()> {
        let (addr, _server) = fake_coordinator(
            b"Node 1 failed, recovered using replica on Node 2\nOK 5 532\nhello",
            0,
        )
        .await?;
        let dl = client(addr).download("/a.txt").await?;
        assert_eq!(&dl.data[..], b"hello");
        assert_eq!(dl.recovery, Some(RecoveryNotice { failed: 1, used: 2 }));
        Ok(())
    }

    #[tokio::test]
    async fn test_download_detects_corruption_in_transit() -> anyhow::Result<()> {
        let (addr, _server) = fake_coordinator(b"OK 5 532\njello", 0).await?;
        let err = client(addr).download("/a.txt").await.unwrap_err();
        assert!(matches!(err, ClientError::ChecksumMismatch));
        assert_eq!(err.to_string(), "checksum mismatch - file may be corrupted");
        Ok(())
    }

    #[tokio::test]
    async fn test_download_short_payload() -> anyhow::Result<()> {
        let (addr, _server) = fake_coordinator(b"OK 5 532\nhel", 0).await?;
        let err = client(addr).download("/a.txt").await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::UnexpectedEof)));
        Ok(())
    }

    #[tokio::test]
    async fn test_download_size_limit() -> anyhow::Result<()> {
        let (addr, _server) = fake_coordinator(b"OK 500 0\n", 0).await?;
        let err = client(addr)
            .with_max_size(100)
            .download("/big")
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::Malformed(_))));
        Ok(())
    }

    #[tokio::test]
    async fn test_server_errors_surface_reason() -> anyhow::Result<()> {
        let (addr, _server) = fake_coordinator(b"ERROR: file not found\n", 0).await?;
        let err = client(addr).delete("/a.txt").await.unwrap_err();
        assert!(matches!(&err, ClientError::Server(r) if r == "file not found"));
        Ok(())
    }

    #[tokio::test]
    async fn test_empty_listings() -> anyhow::Result<()> {
        let (addr, _server) = fake_coordinator(b"No files stored\n", 0).await?;
        assert!(client(addr).list().await?.is_empty());

        let (addr, _server) = fake_coordinator(b"No nodes registered\n", 0).await?;
        assert!(client(addr).nodes().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_listings() -> anyhow::Result<()> {
        let (addr, _server) = fake_coordinator(b"/a\n/b/c\n", 0).await?;
        assert_eq!(client(addr).list().await?, vec!["/a", "/b/c"]);

        let (addr, _server) =
            fake_coordinator(b"1 127.0.0.1:9002 alive\n2 127.0.0.1:9003 down\n", 0).await?;
        let nodes = client(addr).nodes().await?;
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].alive);
        assert!(!nodes[1].alive);
        assert_eq!(nodes[1].addr, "127.0.0.1:9003");
        Ok(())
    }

    #[tokio::test]
    async fn test_invalid_path_rejected_locally() {
        let c = client("127.0.0.1:1".to_string());
        let err = c.download("has space").await.unwrap_err();
        assert!(matches!(err, ClientError::Protocol(ProtocolError::Key(_))));
    }

    #[tokio::test]
    async fn test_timeout() -> anyhow::Result<()> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?.to_string();
        let _hold = tokio::spawn(async move {
            let conn = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(conn);
        });

        let c = Client::new(addr, Duration::from_millis(100));
        assert!(matches!(c.list().await.unwrap_err(), ClientError::Timeout));
        Ok(())
    }
}
