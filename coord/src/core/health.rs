//! Liveness probes. The registry pulls a verdict from a probe right before an
//! operation needs it; nodes never push their status.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use std::collections::HashSet;
use std::fmt;
use std::sync::RwLock;

use common::NodeId;

/// Opaque token a node hands over at registration, later used to probe it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LivenessHandle(String);

impl LivenessHandle {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn token(&self) -> &str {
        &self.0
    }

    /// The token read as a process id. Non-positive values are rejected since
    /// `kill` would address a whole process group.
    pub fn as_pid(&self) -> Option<i32> {
        match self.0.parse::<i32>() {
            Ok(pid) if pid > 0 => Some(pid),
            _ => None,
        }
    }
}

impl fmt::Display for LivenessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A point-in-time failure detector. Implementations must answer `false`
/// whenever they cannot tell.
pub trait LivenessProbe: Send + Sync {
    fn is_alive(&self, node_id: NodeId, handle: &LivenessHandle) -> bool;
}

/// Same-host detector: the handle is the PID of the node process.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessProbe;

impl LivenessProbe for ProcessProbe {
    fn is_alive(&self, _node_id: NodeId, handle: &LivenessHandle) -> bool {
        let Some(pid) = handle.as_pid() else {
            return false;
        };
        // EPERM: the process exists but belongs to someone else.
        matches!(kill(Pid::from_raw(pid), None), Ok(()) | Err(Errno::EPERM))
    }
}

/// Trusts every registered node; only failed calls make a replica unusable.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeAlive;

impl LivenessProbe for AssumeAlive {
    fn is_alive(&self, _node_id: NodeId, _handle: &LivenessHandle) -> bool {
        true
    }
}

/// Wraps another probe and lets an operator (or a test) force nodes down.
pub struct ManualProbe<P = AssumeAlive> {
    inner: P,
    down: RwLock<HashSet<NodeId>>,
}

impl ManualProbe<AssumeAlive> {
    pub fn new() -> Self {
        Self::wrapping(AssumeAlive)
    }
}

impl Default for ManualProbe<AssumeAlive> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: LivenessProbe> ManualProbe<P> {
    pub fn wrapping(inner: P) -> Self {
        Self {
            inner,
            down: RwLock::new(HashSet::new()),
        }
    }

    pub fn mark_down(&self, node_id: NodeId) {
        if let Ok(mut down) = self.down.write() {
            down.insert(node_id);
        }
    }

    pub fn mark_up(&self, node_id: NodeId) {
        if let Ok(mut down) = self.down.write() {
            down.remove(&node_id);
        }
    }
}

impl<P: LivenessProbe> LivenessProbe for ManualProbe<P> {
    fn is_alive(&self, node_id: NodeId, handle: &LivenessHandle) -> bool {
        let forced_down = match self.down.read() {
            Ok(down) => down.contains(&node_id),
            Err(_) => return false,
        };
        !forced_down && self.inner.is_alive(node_id, handle)
    }
}
