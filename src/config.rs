//! Runtime Configuration
//!
//! Plain structs filled in by the CLI (`main.rs`). Every field has a default so tests and
//! embedded use can start from `Default::default()`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::client::DEFAULT_MAX_REDIRECTS;
use crate::ring::NodeInfo;

/// Offset between a node's client port and its internal HTTP port.
pub const INTERNAL_PORT_OFFSET: u16 = 1000;

pub const DEFAULT_SHARD_CAPACITY: usize = 1000;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Internal HTTP port paired with a client-facing port.
pub fn internal_port(port: u16) -> Option<u16> {
    port.checked_add(INTERNAL_PORT_OFFSET)
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address other nodes and clients use to reach this node.
    pub address: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub shard_capacity: usize,
    /// Base URL of the coordinator, e.g. `http://127.0.0.1:4000`.
    pub coordinator_url: String,
    pub poll_interval: Duration,
}

impl NodeConfig {
    pub fn node(&self) -> NodeInfo {
        NodeInfo::new(self.address.clone(), self.port)
    }

    pub fn internal_port(&self) -> Option<u16> {
        internal_port(self.port)
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 5000,
            data_dir: PathBuf::from("data"),
            shard_capacity: DEFAULT_SHARD_CAPACITY,
            coordinator_url: "http://127.0.0.1:4000".to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CoordinatorConfig {
    pub bind: SocketAddr,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 4000)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub seed: NodeInfo,
    pub connect_timeout: Duration,
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            seed: NodeInfo::new("127.0.0.1", 5000),
            connect_timeout: Duration::from_secs(2),
            max_redirects: DEFAULT_MAX_REDIRECTS,
        }
    }
}
