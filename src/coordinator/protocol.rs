//! Coordinator HTTP Protocol
//!
//! Endpoints and JSON bodies of the coordinator API. Join and leave take a `NodeInfo`
//! (`{"address": ..., "port": ...}`) as their body.

use serde::{Deserialize, Serialize};

/// Adds the posted node to the cluster.
pub const ENDPOINT_JOIN: &str = "/join";
/// Removes the posted node from the cluster.
pub const ENDPOINT_LEAVE: &str = "/leave";
/// Current ring snapshot.
pub const ENDPOINT_RING: &str = "/ring";

/// A ring snapshot as served by every endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RingResponse {
    pub version: u64,
    /// Ring in write form; empty while the cluster has no members.
    pub ring: String,
    /// Why a join or leave was refused. The snapshot is the unchanged current one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
