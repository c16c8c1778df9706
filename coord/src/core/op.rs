use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::time::timeout;

use common::error::ApiError;
use common::schemas::error_reason;

use crate::core::node::NodeTarget;

/// Timeouts and limits for calls from the coordinator to storage nodes.
#[derive(Clone, Copy, Debug)]
pub struct NodeClient {
    pub connect_timeout: Duration,
    pub transfer_timeout: Duration,
    pub max_payload: u64,
}

impl NodeClient {
    async fn connect(
        &self,
        target: &NodeTarget,
    ) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf), ApiError> {
        let stream = timeout(self.connect_timeout, TcpStream::connect(&target.addr))
            .await
            .map_err(|_| {
                ApiError::TransportFailure(format!("connect to node {} timed out", target.node_id))
            })?
            .map_err(|e| {
                ApiError::TransportFailure(format!("connect to node {}: {}", target.node_id, e))
            })?;
        let _ = stream.set_nodelay(true);

        let (r, w) = stream.into_split();
        Ok((BufReader::new(r), w))
    }

    /// Runs `exchange` on a fresh connection, bounded by the transfer timeout.
    async fn call<T, F, Fut>(&self, target: &NodeTarget, exchange: F) -> Result<T, ApiError>
    where
        F: FnOnce(BufReader<OwnedReadHalf>, OwnedWriteHalf) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        let (reader, writer) = self.connect(target).await?;
        timeout(self.transfer_timeout, exchange(reader, writer))
            .await
            .map_err(|_| {
                ApiError::TransportFailure(format!("call to node {} timed out", target.node_id))
            })?
            .map_err(|e| match e {
                ApiError::Io(e) => {
                    ApiError::TransportFailure(format!("node {}: {}", target.node_id, e))
                }
                other => other,
            })
    }
}

/// Maps a reply line that is neither the expected token nor parseable.
fn unexpected_reply(target: &NodeTarget, line: &str) -> ApiError {
    match error_reason(line) {
        Some(reason) => ApiError::NodeRejected(reason.to_string()),
        None => ApiError::TransportFailure(format!(
            "unexpected reply from node {}: {:?}",
            target.node_id, line
        )),
    }
}

async fn finish_write(writer: &mut OwnedWriteHalf) -> Result<(), ApiError> {
    writer.flush().await?;
    Ok(())
}

pub mod store {
    use bytes::Bytes;
    use futures_util::future::join_all;
    use tracing::warn;

    use common::NodeId;
    use common::error::ApiError;
    use common::protocol::{expect_line, write_line, write_payload};
    use common::schemas::{NodeRequest, OK};

    use super::{NodeClient, finish_write, unexpected_reply};
    use crate::core::node::NodeTarget;

    /// Sends the payload to every target concurrently and waits for all of
    /// them. Results come back in target order.
    pub async fn store_all(
        client: &NodeClient,
        targets: &[NodeTarget],
        path: &str,
        data: &Bytes,
        checksum: u64,
    ) -> Vec<(NodeId, Result<(), ApiError>)> {
        let results = join_all(
            targets
                .iter()
                .map(|t| send_store(client, t, path, data.clone(), checksum)),
        )
        .await;

        targets
            .iter()
            .zip(results)
            .map(|(t, res)| {
                if let Err(e) = &res {
                    warn!(node_id = t.node_id, path, "store failed: {}", e);
                }
                (t.node_id, res)
            })
            .collect()
    }

    pub async fn send_store(
        client: &NodeClient,
        target: &NodeTarget,
        path: &str,
        data: Bytes,
        checksum: u64,
    ) -> Result<(), ApiError> {
        let req = NodeRequest::Store {
            path: path.to_string(),
            size: data.len() as u64,
            checksum,
        };

        client
            .call(target, |mut reader, mut writer| async move {
                write_line(&mut writer, &req.encode()).await?;
                write_payload(&mut writer, &data).await?;
                finish_write(&mut writer).await?;

                let line = expect_line(&mut reader).await?;
                if line.trim() == OK {
                    Ok(())
                } else {
                    Err(unexpected_reply(target, &line))
                }
            })
            .await
    }
}

pub mod fetch {
    use bytes::Bytes;

    use common::error::ApiError;
    use common::protocol::{expect_line, parse_u64, read_payload, write_line};
    use common::schemas::{NodeRequest, error_reason};

    use super::{NodeClient, finish_write, unexpected_reply};
    use crate::core::node::NodeTarget;

    /// A copy as returned by one node. `checksum` is what the node declares;
    /// the caller decides whether to trust it.
    #[derive(Debug, Clone)]
    pub struct Fetched {
        pub size: u64,
        pub checksum: u64,
        pub data: Bytes,
    }

    pub async fn fetch(
        client: &NodeClient,
        target: &NodeTarget,
        path: &str,
    ) -> Result<Fetched, ApiError> {
        let req = NodeRequest::Get {
            path: path.to_string(),
        };
        let max_payload = client.max_payload;

        client
            .call(target, |mut reader, mut writer| async move {
                write_line(&mut writer, &req.encode()).await?;
                finish_write(&mut writer).await?;

                let size_line = expect_line(&mut reader).await?;
                if let Some(reason) = error_reason(&size_line) {
                    return Err(ApiError::NodeRejected(reason.to_string()));
                }
                let size = parse_u64(&size_line, "size")
                    .map_err(|_| unexpected_reply(target, &size_line))?;
                if size > max_payload {
                    return Err(ApiError::TransportFailure(format!(
                        "node {} announced {} bytes, limit is {}",
                        target.node_id, size, max_payload
                    )));
                }

                let checksum_line = expect_line(&mut reader).await?;
                let checksum = parse_u64(&checksum_line, "checksum")
                    .map_err(|_| unexpected_reply(target, &checksum_line))?;

                let data = read_payload(&mut reader, size).await?;

                Ok(Fetched {
                    size,
                    checksum,
                    data,
                })
            })
            .await
    }
}

pub mod remove {
    use futures_util::future::join_all;
    use tracing::warn;

    use common::NodeId;
    use common::error::ApiError;
    use common::protocol::{expect_line, write_line};
    use common::schemas::{NodeRequest, OK};

    use super::{NodeClient, finish_write, unexpected_reply};
    use crate::core::node::NodeTarget;

    pub async fn remove_all(
        client: &NodeClient,
        targets: &[NodeTarget],
        path: &str,
    ) -> Vec<(NodeId, Result<(), ApiError>)> {
        let results = join_all(targets.iter().map(|t| send_remove(client, t, path))).await;

        targets
            .iter()
            .zip(results)
            .map(|(t, res)| {
                if let Err(e) = &res {
                    warn!(node_id = t.node_id, path, "delete failed: {}", e);
                }
                (t.node_id, res)
            })
            .collect()
    }

    pub async fn send_remove(
        client: &NodeClient,
        target: &NodeTarget,
        path: &str,
    ) -> Result<(), ApiError> {
        let req = NodeRequest::Delete {
            path: path.to_string(),
        };

        client
            .call(target, |mut reader, mut writer| async move {
                write_line(&mut writer, &req.encode()).await?;
                finish_write(&mut writer).await?;

                let line = expect_line(&mut reader).await?;
                if line.trim() == OK {
                    Ok(())
                } else {
                    Err(unexpected_reply(target, &line))
                }
            })
            .await
    }
}
