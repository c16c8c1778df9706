use std::io;

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("invalid file size")]
    InvalidSize,
    #[error("not enough alive nodes (need at least {required}, found {alive})")]
    InsufficientReplicas { required: usize, alive: usize },
    #[error("failed to store file on any node")]
    WriteFailed,
    #[error("file not found")]
    NotFound,
    #[error("all replicas are unavailable")]
    AllReplicasUnavailable,
    #[error("checksum mismatch - data corruption detected")]
    IntegrityFailure,
    #[error("failed to delete from any node")]
    DeleteFailed,
    #[error("transport failure: {0}")]
    TransportFailure(String),
    #[error("node rejected request: {0}")]
    NodeRejected(String),
    #[error("unknown command")]
    UnknownCommand,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Any(#[from] anyhow::Error),
}

impl ApiError {
    /// The single terminal line sent back to a peer for this error.
    pub fn to_reply(&self) -> String {
        format!("ERROR: {}", self)
    }
}

impl From<KeyError> for ApiError {
    fn from(e: KeyError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<ProtocolError> for ApiError {
    fn from(e: ProtocolError) -> Self {
        match e {
            ProtocolError::Io(e) => ApiError::TransportFailure(e.to_string()),
            ProtocolError::UnexpectedEof | ProtocolError::TimedOut => {
                ApiError::TransportFailure(e.to_string())
            }
            ProtocolError::UnknownCommand(_) => ApiError::UnknownCommand,
            ProtocolError::Key(e) => ApiError::BadRequest(e.to_string()),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum KeyError {
    #[error("path length out of bounds")]
    Length,
    #[error("path contains whitespace or control characters")]
    Forbidden,
}

#[derive(thiserror::Error, Debug)]
pub enum ProtocolError {
    #[error("connection closed mid-message")]
    UnexpectedEof,
    #[error("timed out waiting for peer")]
    TimedOut,
    #[error("command line too long")]
    LineTooLong,
    #[error("command line is not valid utf-8")]
    InvalidUtf8,
    #[error("unknown command")]
    UnknownCommand(String),
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Io(#[from] io::Error),
}
