use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ring::Position;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("shard encoding error: {0}")]
    Encode(#[from] bincode::Error),

    /// A merge was refused; both shards stay as they were.
    #[error("merged shard would hold {combined} entries, capacity is {capacity}")]
    CapacityExceeded { combined: usize, capacity: usize },

    #[error("shards ending at {lower} and starting at {upper} are not adjacent")]
    NotAdjacent { lower: Position, upper: String },

    #[error("shard holds {0} entries, at least 2 are needed to split")]
    Unsplittable(usize),

    #[error("corrupt shard directory: {0}")]
    Corrupt(String),
}

/// A stored value together with the password hash guarding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub value: Vec<u8>,
    pub password: Option<String>,
}

impl Record {
    pub fn new(value: Vec<u8>, password: Option<String>) -> Self {
        Self { value, password }
    }

    /// A record only admits requests carrying exactly its password hash ("none" included).
    pub fn admits(&self, password: Option<&str>) -> bool {
        self.password.as_deref() == password
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutStatus {
    Created,
    Updated,
    PasswordMismatch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetStatus {
    Found(Vec<u8>),
    NotFound,
    PasswordMismatch,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteStatus {
    Deleted,
    NotFound,
    PasswordMismatch,
}

/// Hash interval `(start, end]` covered by one shard.
///
/// Unlike ring intervals these never wrap: the shards of a node tile `[0, MAX]` in order, and
/// the first one has no lower bound (`start == None` includes position zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardRange {
    pub start: Option<Position>,
    pub end: Position,
}

impl ShardRange {
    pub fn full() -> Self {
        Self {
            start: None,
            end: Position::MAX,
        }
    }

    pub fn contains(&self, hash: Position) -> bool {
        self.start.is_none_or(|start| hash > start) && hash <= self.end
    }
}
