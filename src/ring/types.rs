use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Width of a position rendered as hex.
pub const POSITION_HEX_WIDTH: usize = 32;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RingError {
    /// No node is known, so nothing can be resolved.
    #[error("hash ring is empty")]
    Empty,

    /// Ring text could not be parsed. The previous ring should be kept.
    #[error("malformed ring metadata: {0}")]
    Malformed(String),
}

/// A point in the 128-bit hash space.
///
/// Ordering is plain numeric ordering, which matches the lexicographic ordering of the
/// fixed-width hex form used on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Position(pub u128);

impl Position {
    pub const MIN: Position = Position(0);
    pub const MAX: Position = Position(u128::MAX);

    /// Hashes arbitrary bytes: the first 16 bytes of their SHA-256 digest, big-endian.
    pub fn hash_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut prefix = [0u8; 16];
        prefix.copy_from_slice(&digest[..16]);
        Self(u128::from_be_bytes(prefix))
    }

    pub fn of_key(key: &str) -> Self {
        Self::hash_bytes(key.as_bytes())
    }

    pub fn of_node(node: &NodeInfo) -> Self {
        Self::hash_bytes(node.to_string().as_bytes())
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for Position {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != POSITION_HEX_WIDTH {
            return Err(RingError::Malformed(format!(
                "position '{}' is not {} hex digits",
                s, POSITION_HEX_WIDTH
            )));
        }
        u128::from_str_radix(s, 16)
            .map(Position)
            .map_err(|e| RingError::Malformed(format!("position '{}': {}", s, e)))
    }
}

/// Network identity of a storage node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInfo {
    pub address: String,
    pub port: u16,
}

impl NodeInfo {
    pub fn new(address: impl Into<String>, port: u16) -> Self {
        Self {
            address: address.into(),
            port,
        }
    }

    pub fn position(&self) -> Position {
        Position::of_node(self)
    }
}

impl fmt::Display for NodeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

impl FromStr for NodeInfo {
    type Err = RingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, port) = s
            .rsplit_once(':')
            .ok_or_else(|| RingError::Malformed(format!("node '{}' has no port", s)))?;
        if address.is_empty() {
            return Err(RingError::Malformed(format!("node '{}' has no address", s)));
        }
        let port = port
            .parse::<u16>()
            .map_err(|e| RingError::Malformed(format!("node '{}': {}", s, e)))?;
        Ok(Self::new(address, port))
    }
}

/// A circular interval `(start, end]` of the ring.
///
/// `start == end` covers the whole ring (a single node, or a node that replicates everything).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashRange {
    pub start: Position,
    pub end: Position,
}

impl HashRange {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn is_full(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, hash: Position) -> bool {
        if self.start < self.end {
            self.start < hash && hash <= self.end
        } else {
            // wraps past the top of the hash space (or covers everything)
            hash > self.start || hash <= self.end
        }
    }
}
