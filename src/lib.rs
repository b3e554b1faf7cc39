//! Distributed Key-Value Store Library
//!
//! This library crate defines the core modules of `ringkv`: storage nodes sharing a keyspace
//! through consistent hashing, a coordinator tracking membership, and a routing client.
//! It serves as the foundation for the binary executable (`main.rs`).
//!
//! ## Architecture Modules
//! - **`ring`**: The consistent-hash ring shared by every participant. Maps key hashes to
//!   responsible and replica nodes and defines the ring wire format.
//! - **`storage`**: A node's persistent data, split into capacity-bounded shards that split
//!   when they fill up and merge back after hand-offs.
//! - **`protocol`**: The line protocol spoken between clients and nodes.
//! - **`client`**: `RoutingClient`, which routes requests, retries with backoff and refreshes
//!   its ring when the cluster changes.
//! - **`server`**: The node's TCP listener, command processor, replication and rebalancing.
//! - **`coordinator`**: Membership and versioned ring snapshots served over HTTP.
//! - **`config`**: Runtime settings for the three roles.
//! - **`http`**: Retry helpers for internal HTTP calls.

pub mod client;
pub mod config;
pub mod coordinator;
pub mod http;
pub mod protocol;
pub mod ring;
pub mod server;
pub mod storage;
