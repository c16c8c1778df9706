use std::fmt;

use crate::NodeId;
use crate::error::ProtocolError;
use crate::key_utils::validate_path;
use crate::protocol::parse_u64;

/// Commands accepted by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Register {
        node_id: NodeId,
        token: String,
        addr: Option<String>,
    },
    Upload {
        path: String,
    },
    Download {
        path: String,
    },
    List,
    Delete {
        path: String,
    },
    Nodes,
}

impl Request {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let req = match (cmd, args.as_slice()) {
            ("REGISTER", [id, token]) => Request::Register {
                node_id: parse_node_id(id)?,
                token: token.to_string(),
                addr: None,
            },
            ("REGISTER", [id, token, addr]) => Request::Register {
                node_id: parse_node_id(id)?,
                token: token.to_string(),
                addr: Some(addr.to_string()),
            },
            ("UPLOAD", [path]) => Request::Upload {
                path: checked_path(path)?,
            },
            ("DOWNLOAD", [path]) => Request::Download {
                path: checked_path(path)?,
            },
            ("DELETE", [path]) => Request::Delete {
                path: checked_path(path)?,
            },
            ("LIST", []) => Request::List,
            ("NODES", []) => Request::Nodes,
            ("REGISTER" | "UPLOAD" | "DOWNLOAD" | "DELETE" | "LIST" | "NODES", _) => {
                return Err(ProtocolError::Malformed(format!(
                    "wrong number of arguments for {}",
                    cmd
                )));
            }
            _ => return Err(ProtocolError::UnknownCommand(cmd.to_string())),
        };
        Ok(req)
    }

    pub fn encode(&self) -> String {
        match self {
            Request::Register {
                node_id,
                token,
                addr: Some(addr),
            } => format!("REGISTER {} {} {}", node_id, token, addr),
            Request::Register {
                node_id,
                token,
                addr: None,
            } => format!("REGISTER {} {}", node_id, token),
            Request::Upload { path } => format!("UPLOAD {}", path),
            Request::Download { path } => format!("DOWNLOAD {}", path),
            Request::List => "LIST".to_string(),
            Request::Delete { path } => format!("DELETE {}", path),
            Request::Nodes => "NODES".to_string(),
        }
    }
}

/// Commands accepted by a storage node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeRequest {
    Store {
        path: String,
        size: u64,
        checksum: u64,
    },
    Get {
        path: String,
    },
    Delete {
        path: String,
    },
}

impl NodeRequest {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut parts = line.split_whitespace();
        let cmd = parts.next().unwrap_or_default();
        let args: Vec<&str> = parts.collect();

        let req = match (cmd, args.as_slice()) {
            ("STORE", [path, size, checksum]) => NodeRequest::Store {
                path: checked_path(path)?,
                size: parse_u64(size, "size")?,
                checksum: parse_u64(checksum, "checksum")?,
            },
            ("GET", [path]) => NodeRequest::Get {
                path: checked_path(path)?,
            },
            ("DELETE", [path]) => NodeRequest::Delete {
                path: checked_path(path)?,
            },
            ("STORE" | "GET" | "DELETE", _) => {
                return Err(ProtocolError::Malformed(format!(
                    "wrong number of arguments for {}",
                    cmd
                )));
            }
            _ => return Err(ProtocolError::UnknownCommand(cmd.to_string())),
        };
        Ok(req)
    }

    pub fn encode(&self) -> String {
        match self {
            NodeRequest::Store {
                path,
                size,
                checksum,
            } => format!("STORE {} {} {}", path, size, checksum),
            NodeRequest::Get { path } => format!("GET {}", path),
            NodeRequest::Delete { path } => format!("DELETE {}", path),
        }
    }
}

pub const OK: &str = "OK";
pub const DELETED: &str = "DELETED";
const ERROR_PREFIX: &str = "ERROR";

/// Returns the reason carried by an `ERROR: <reason>` line, if it is one.
pub fn error_reason(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(ERROR_PREFIX)?;
    if rest.is_empty() {
        return Some(rest);
    }
    Some(rest.strip_prefix(':')?.trim())
}

pub fn registered_reply(node_id: NodeId) -> String {
    format!("REGISTERED {}", node_id)
}

pub fn parse_registered(line: &str) -> Result<NodeId, ProtocolError> {
    match line.split_whitespace().collect::<Vec<_>>().as_slice() {
        ["REGISTERED", id] => parse_node_id(id),
        _ => Err(ProtocolError::Malformed(format!("unexpected reply {:?}", line))),
    }
}

pub fn stored_reply(nodes: &[NodeId]) -> String {
    let mut line = String::from("STORED");
    for n in nodes {
        line.push(' ');
        line.push_str(&n.to_string());
    }
    line
}

pub fn parse_stored(line: &str) -> Result<Vec<NodeId>, ProtocolError> {
    let mut parts = line.split_whitespace();
    if parts.next() != Some("STORED") {
        return Err(ProtocolError::Malformed(format!("unexpected reply {:?}", line)));
    }
    parts.map(parse_node_id).collect()
}

/// `OK <size> <checksum>`, the line preceding a download payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataHeader {
    pub size: u64,
    pub checksum: u64,
}

impl fmt::Display for DataHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", OK, self.size, self.checksum)
    }
}

impl DataHeader {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        match line.split_whitespace().collect::<Vec<_>>().as_slice() {
            [OK, size, checksum] => Ok(DataHeader {
                size: parse_u64(size, "size")?,
                checksum: parse_u64(checksum, "checksum")?,
            }),
            _ => Err(ProtocolError::Malformed(format!("unexpected reply {:?}", line))),
        }
    }
}

/// Emitted ahead of a download served by a replica other than the primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecoveryNotice {
    pub failed: NodeId,
    pub used: NodeId,
}

impl fmt::Display for RecoveryNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Node {} failed, recovered using replica on Node {}",
            self.failed, self.used
        )
    }
}

impl RecoveryNotice {
    pub fn parse(line: &str) -> Option<Self> {
        let rest = line.strip_prefix("Node ")?;
        let (failed, rest) = rest.split_once(" failed, recovered using replica on Node ")?;
        Some(RecoveryNotice {
            failed: failed.trim().parse().ok()?,
            used: rest.trim().parse().ok()?,
        })
    }
}

/// One line of the `NODES` listing: `<id> <addr> alive|down`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeStatusLine {
    pub node_id: NodeId,
    pub addr: String,
    pub alive: bool,
}

impl fmt::Display for NodeStatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.alive { "alive" } else { "down" };
        write!(f, "{} {} {}", self.node_id, self.addr, status)
    }
}

impl NodeStatusLine {
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        match line.split_whitespace().collect::<Vec<_>>().as_slice() {
            [id, addr, status] => Ok(NodeStatusLine {
                node_id: parse_node_id(id)?,
                addr: addr.to_string(),
                alive: match *status {
                    "alive" => true,
                    "down" => false,
                    other => {
                        return Err(ProtocolError::Malformed(format!(
                            "invalid node status {:?}",
                            other
                        )));
                    }
                },
            }),
            _ => Err(ProtocolError::Malformed(format!("unexpected line {:?}", line))),
        }
    }
}

fn parse_node_id(field: &str) -> Result<NodeId, ProtocolError> {
    match field.parse::<NodeId>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(ProtocolError::Malformed(format!("invalid node id {:?}", field))),
    }
}

fn checked_path(path: &str) -> Result<String, ProtocolError> {
    validate_path(path)?;
    Ok(path.to_string())
}
