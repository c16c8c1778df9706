//! Line-oriented framing: a `\n`-terminated command or status line, optionally
//! followed by a raw payload whose length was announced on a previous line.

use bytes::Bytes;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::constants::MAX_LINE_LEN;
use crate::error::ProtocolError;

/// Reads one line, without its terminator. `Ok(None)` means the peer closed
/// the connection before sending anything.
pub async fn read_line<R>(reader: &mut R) -> Result<Option<String>, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let n = (&mut *reader)
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', &mut buf)
        .await?;

    if n == 0 {
        return Ok(None);
    }
    if buf.last() != Some(&b'\n') {
        if buf.len() > MAX_LINE_LEN {
            return Err(ProtocolError::LineTooLong);
        }
        return Err(ProtocolError::UnexpectedEof);
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|_| ProtocolError::InvalidUtf8)
}

/// Like [`read_line`] but treats a closed connection as an error.
pub async fn expect_line<R>(reader: &mut R) -> Result<String, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    read_line(reader).await?.ok_or(ProtocolError::UnexpectedEof)
}

/// Reads exactly `size` payload bytes. The caller is responsible for bounding
/// `size` before calling.
pub async fn read_payload<R>(reader: &mut R, size: u64) -> Result<Bytes, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let len = usize::try_from(size)
        .map_err(|_| ProtocolError::Malformed(format!("payload size {} too large", size)))?;
    let mut buf = vec![0u8; len];
    match reader.read_exact(&mut buf).await {
        Ok(_) => Ok(Bytes::from(buf)),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Err(ProtocolError::UnexpectedEof),
        Err(e) => Err(ProtocolError::Io(e)),
    }
}

pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut buf = Vec::with_capacity(line.len() + 1);
    buf.extend_from_slice(line.as_bytes());
    buf.push(b'\n');
    writer.write_all(&buf).await
}

pub async fn write_payload<W>(writer: &mut W, payload: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(payload).await?;
    writer.flush().await
}

/// Bounds a read from a peer. A peer that stops sending mid-request must not
/// hold the connection, or anything the handler acquired, indefinitely.
pub async fn within<T, F>(limit: Duration, read: F) -> Result<T, ProtocolError>
where
    F: Future<Output = Result<T, ProtocolError>>,
{
    tokio::time::timeout(limit, read)
        .await
        .map_err(|_| ProtocolError::TimedOut)?
}

/// Parses a decimal unsigned field, naming it in the error.
pub fn parse_u64(field: &str, what: &str) -> Result<u64, ProtocolError> {
    field
        .trim()
        .parse::<u64>()
        .map_err(|_| ProtocolError::Malformed(format!("invalid {}: {:?}", what, field)))
}
