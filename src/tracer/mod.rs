use std::net::IpAddr;

use anyhow::{bail, Result};
use serde::Serialize;

use crate::top::stats::TableWriter;

/// IP family of a traced connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Parse the host framework's family parameter ("4" or "6", empty = unfiltered).
    pub fn parse_param(s: &str) -> Result<Option<IpFamily>> {
        match s.trim() {
            "" => Ok(None),
            "4" => Ok(Some(IpFamily::V4)),
            "6" => Ok(Some(IpFamily::V6)),
            other => bail!("invalid IP family {other:?}: expected 4 or 6"),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            IpFamily::V4 => 4,
            IpFamily::V6 => 6,
        }
    }
}

impl std::fmt::Display for IpFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Direction of a traffic sample relative to the traced process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Tx,
    Rx,
}

/// One raw per-connection traffic observation from the kernel tracer.
///
/// The kernel side is an external collaborator; this struct is the wire
/// contract at the user-space boundary. Samples for the same connection
/// are accumulated into the live counter table by a [`TableWriter`].
#[derive(Debug, Clone)]
pub struct TrafficSample {
    pub pid: u32,
    pub comm: String,
    pub uid: u32,
    pub gid: u32,
    pub saddr: IpAddr,
    pub daddr: IpAddr,
    pub sport: u16,
    pub dport: u16,
    pub family: IpFamily,
    pub direction: Direction,
    pub bytes: u64,
}

/// Attach seam for a kernel-level traffic tracer.
///
/// Implementations receive a [`TableWriter`] and feed it samples for the
/// lifetime of the agent. The agent runs without one (the counter table
/// simply stays empty), which keeps the kernel dependency out of this
/// crate's scope.
pub trait TrafficSource: Send {
    /// Returns the source's name for logging.
    fn name(&self) -> &str;

    /// Begin producing samples into the given writer.
    fn attach(&mut self, writer: TableWriter) -> Result<()>;

    /// Stop producing samples.
    fn detach(&mut self) -> Result<()>;
}
