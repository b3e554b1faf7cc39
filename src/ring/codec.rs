//! Ring Wire Codec
//!
//! The ring travels as a sequence of `start,end,address:port;` tuples, one per node, with
//! positions rendered as 32 hex digits. `end` is the node's own position. In the write form
//! `start` is the predecessor's position; in the read form it is pushed back over the replica
//! predecessors so the tuple describes everything the node can answer `get` for.
//!
//! Decoding is strict: a single malformed tuple fails the whole ring, because a silently
//! truncated ring would route keys to the wrong nodes.

use regex::Regex;
use std::sync::LazyLock;

use super::hash_ring::HashRing;
use super::types::{NodeInfo, Position, RingError};

static TUPLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([0-9a-fA-F]{32}),([0-9a-fA-F]{32}),([^,;:\s]+):([0-9]{1,5})$")
        .expect("ring tuple pattern is valid")
});

/// Write form: each node with the interval it accepts writes for.
pub fn encode(ring: &HashRing) -> String {
    encode_with(ring, |position| ring.write_range(position).map(|r| r.start))
}

/// Read form: each node with the interval it serves reads for, replicas included.
pub fn encode_read(ring: &HashRing, replicas: usize) -> String {
    encode_with(ring, |position| {
        ring.read_range(position, replicas).map(|r| r.start)
    })
}

fn encode_with(ring: &HashRing, start_of: impl Fn(Position) -> Option<Position>) -> String {
    let mut wire = String::with_capacity(ring.len() * 90);
    for (position, node) in ring.iter() {
        let start = start_of(*position).unwrap_or(*position);
        wire.push_str(&format!("{},{},{};", start, position, node));
    }
    wire
}

/// Parses either wire form back into a ring keyed by each tuple's `end` position.
pub fn decode(wire: &str) -> Result<HashRing, RingError> {
    let wire = wire.trim();
    if wire.is_empty() {
        return Err(RingError::Malformed("empty ring".to_string()));
    }
    let Some(body) = wire.strip_suffix(';') else {
        return Err(RingError::Malformed(
            "ring is not terminated by ';'".to_string(),
        ));
    };

    let mut ring = HashRing::new();
    for (index, tuple) in body.split(';').enumerate() {
        let (position, node) = decode_tuple(tuple)
            .map_err(|e| RingError::Malformed(format!("tuple {}: {}", index, e)))?;
        if ring.insert(position, node).is_some() {
            return Err(RingError::Malformed(format!(
                "tuple {}: duplicate position {}",
                index, position
            )));
        }
    }
    Ok(ring)
}

fn decode_tuple(tuple: &str) -> Result<(Position, NodeInfo), String> {
    let captures = TUPLE
        .captures(tuple)
        .ok_or_else(|| format!("'{}' is not start,end,address:port", tuple))?;

    // start is validated for shape only; ownership is derived from the end positions
    captures[1]
        .to_ascii_lowercase()
        .parse::<Position>()
        .map_err(|e| e.to_string())?;
    let end = captures[2]
        .to_ascii_lowercase()
        .parse::<Position>()
        .map_err(|e| e.to_string())?;
    let port = captures[4]
        .parse::<u16>()
        .map_err(|e| format!("port '{}': {}", &captures[4], e))?;

    Ok((end, NodeInfo::new(&captures[3], port)))
}
