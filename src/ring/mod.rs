//! Consistent-Hash Ring Module
//!
//! The metadata model shared by clients, storage nodes and the coordinator.
//!
//! ## Core Concepts
//! - **Positions**: Keys and nodes are hashed into a 128-bit space (`Position`), rendered on the
//!   wire as fixed-width hex so textual and numeric ordering agree.
//! - **Responsibility**: A key belongs to the first node whose position is `>=` the key hash,
//!   wrapping around to the smallest position.
//! - **Replicas**: The n-th successor of the responsible node holds the n-th copy and may serve reads.
//! - **Snapshots**: Rings are immutable once shared. `RingCache` swaps whole `Arc<HashRing>` snapshots.
//!
//! ## Submodules
//! - **`types`**: `Position`, `NodeInfo`, `HashRange` and the ring error type.
//! - **`hash_ring`**: The ordered ring itself and its lookup operations.
//! - **`codec`**: Text wire form (`start,end,address:port;` tuples) used by `keyrange` responses.
//! - **`cache`**: Atomically replaced ring snapshots.

pub mod cache;
pub mod codec;
pub mod hash_ring;
pub mod types;

pub use cache::RingCache;
pub use hash_ring::HashRing;
pub use types::{HashRange, NodeInfo, Position, RingError};

/// Number of successors holding a copy of each key.
pub const REPLICATION_FACTOR: usize = 2;

#[cfg(test)]
mod tests;
