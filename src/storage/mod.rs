//! Node Storage Module
//!
//! Implements the persistent, capacity-bounded key-value storage of a single node.
//!
//! ## Core Concepts
//! - **Shards**: Data is grouped into `StorageShard`s, each covering a contiguous hash interval
//!   `(start, end]` and backed by one file. Together the shards tile the whole hash space.
//! - **Split**: A write that pushes a shard over capacity splits it at the median key hash.
//! - **Merge**: Neighbouring shards are merged back when their combined size fits (after keys
//!   are handed off to other nodes).
//! - **Passwords**: Every record may carry a password hash; reads and writes must present the
//!   same hash (or none, for unprotected records).
//! - **Atomicity**: Files are replaced via temp file + rename, and split/merge only take effect
//!   in memory once every file write succeeded.

pub mod shard;
pub mod store;
pub mod types;

pub use shard::{SplitResult, StorageShard};
pub use store::KvStore;
pub use types::{DeleteStatus, GetStatus, PutStatus, Record, ShardRange, StorageError};
