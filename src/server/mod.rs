//! Storage Node Server Module
//!
//! Everything a storage node runs besides its `KvStore`: the client-facing line protocol
//! listener, the command processor, replication to successors and ring-change hand-off.
//!
//! ## Core Concepts
//! - **Responsibility Checks**: Requests for keys outside the node's interval are answered with
//!   `server_not_responsible`, which makes clients refresh their ring.
//! - **Status**: `Stopped` until a ring is installed, `WriteLock` while entries are handed off,
//!   `Active` otherwise.
//! - **Replication**: Successful writes are copied best-effort to the next two ring successors.
//! - **Hand-off**: After a ring change, entries outside the node's read interval are sent to
//!   their new owner; undeliverable ones are kept.
//!
//! ## Submodules
//! - **`processor`**: `CommandProcessor`, request line in, response line out.
//! - **`listener`**: Tokio TCP accept loop.
//! - **`replication`**: Internal HTTP API (port + 1000) and its client.
//! - **`rebalance`**: Coordinator polling and hand-off.
//! - **`status`**: Shared server status.

pub mod listener;
pub mod processor;
pub mod rebalance;
pub mod replication;
pub mod status;

pub use processor::CommandProcessor;
pub use rebalance::Rebalancer;
pub use replication::Replicator;
pub use status::{ServerStatus, StatusCell};

#[cfg(test)]
mod tests;
