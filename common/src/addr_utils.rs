use anyhow::{Result, anyhow};

use crate::NodeId;

/// Conventional address of a node that did not advertise one:
/// `<host>:<base_port + node_id>`.
pub fn default_node_addr(host: &str, base_port: u16, node_id: NodeId) -> Result<String> {
    let port = u32::from(base_port)
        .checked_add(node_id)
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| anyhow!("invalid node id {} (port exceeds maximum)", node_id))?;
    Ok(format!("{}:{}", host, port))
}

/// Checks an advertised `host:port` before it is stored in the registry.
pub fn sanitize_addr(addr: &str) -> Result<String> {
    let addr = addr.trim();
    if addr.is_empty() {
        return Err(anyhow!("address cannot be empty"));
    }
    if addr.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(anyhow!("address contains invalid characters"));
    }
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("address {:?} is missing a port", addr))?;
    if host.is_empty() {
        return Err(anyhow!("address {:?} is missing a host", addr));
    }
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(addr.to_string()),
        _ => Err(anyhow!("address {:?} has an invalid port", addr)),
    }
}
