use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};

use super::types::{HashRange, NodeInfo, Position, RingError};

/// Ordered mapping from ring positions to the nodes that own them.
///
/// Lookups are `O(log n)` successor queries on the underlying `BTreeMap`. A ring is built once
/// and then shared read-only; removing a node produces a new ring (`without`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashRing {
    entries: BTreeMap<Position, NodeInfo>,
}

impl HashRing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a ring placing each node at the hash of its `address:port`.
    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeInfo>) -> Self {
        let entries = nodes
            .into_iter()
            .map(|node| (node.position(), node))
            .collect();
        Self { entries }
    }

    /// Places `node` at `position`, returning the node previously there.
    pub fn insert(&mut self, position: Position, node: NodeInfo) -> Option<NodeInfo> {
        self.entries.insert(position, node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Position, &NodeInfo)> {
        self.entries.iter()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.entries.values()
    }

    pub fn get(&self, position: Position) -> Option<&NodeInfo> {
        self.entries.get(&position)
    }

    pub fn position_of(&self, node: &NodeInfo) -> Option<Position> {
        self.entries
            .iter()
            .find(|(_, candidate)| *candidate == node)
            .map(|(position, _)| *position)
    }

    /// Copy of this ring with the entry at `position` dropped.
    pub fn without(&self, position: Position) -> Self {
        let mut entries = self.entries.clone();
        entries.remove(&position);
        Self { entries }
    }

    /// Smallest position `>= hash`, wrapping to the first entry.
    fn successor(&self, hash: Position) -> Result<(Position, &NodeInfo), RingError> {
        self.entries
            .range(hash..)
            .next()
            .or_else(|| self.entries.iter().next())
            .map(|(position, node)| (*position, node))
            .ok_or(RingError::Empty)
    }

    fn next_after(&self, position: Position) -> Option<(Position, &NodeInfo)> {
        self.entries
            .range((Excluded(position), Unbounded))
            .next()
            .or_else(|| self.entries.iter().next())
            .map(|(position, node)| (*position, node))
    }

    fn previous_before(&self, position: Position) -> Option<Position> {
        self.entries
            .range(..position)
            .next_back()
            .or_else(|| self.entries.iter().next_back())
            .map(|(position, _)| *position)
    }

    /// The node whose interval contains `key_hash`.
    pub fn responsible(&self, key_hash: Position) -> Result<&NodeInfo, RingError> {
        self.successor(key_hash).map(|(_, node)| node)
    }

    /// The `offset`-th successor of the responsible node, walking the ring circularly.
    ///
    /// `offset == 0` is the responsible node itself.
    pub fn replica(&self, key_hash: Position, offset: usize) -> Result<&NodeInfo, RingError> {
        let (mut position, mut node) = self.successor(key_hash)?;
        for _ in 0..(offset % self.entries.len()) {
            let (next_position, next_node) = self.next_after(position).ok_or(RingError::Empty)?;
            position = next_position;
            node = next_node;
        }
        Ok(node)
    }

    /// The position `steps` entries before `position`. Whole laps return `position` itself.
    pub fn predecessor(&self, position: Position, steps: usize) -> Option<Position> {
        if self.entries.is_empty() {
            return None;
        }
        let mut current = position;
        for _ in 0..(steps % self.entries.len()) {
            current = self.previous_before(current)?;
        }
        Some(current)
    }

    /// Interval the node at `position` accepts writes for: `(predecessor, position]`.
    pub fn write_range(&self, position: Position) -> Option<HashRange> {
        if !self.entries.contains_key(&position) {
            return None;
        }
        let start = self.predecessor(position, 1)?;
        Some(HashRange::new(start, position))
    }

    /// Interval the node at `position` serves reads for: its own interval plus the intervals
    /// of the `replicas` predecessors it holds copies for.
    pub fn read_range(&self, position: Position, replicas: usize) -> Option<HashRange> {
        if !self.entries.contains_key(&position) {
            return None;
        }
        // every node holds a copy of everything
        if replicas + 1 >= self.entries.len() {
            return Some(HashRange::new(position, position));
        }
        let start = self.predecessor(position, replicas + 1)?;
        Some(HashRange::new(start, position))
    }

    pub fn is_responsible(&self, node: &NodeInfo, key_hash: Position) -> bool {
        self.responsible(key_hash)
            .map(|owner| owner == node)
            .unwrap_or(false)
    }

    pub fn is_read_responsible(&self, node: &NodeInfo, key_hash: Position, replicas: usize) -> bool {
        self.position_of(node)
            .and_then(|position| self.read_range(position, replicas))
            .map(|range| range.contains(key_hash))
            .unwrap_or(false)
    }

    /// The distinct nodes holding copies of `key_hash` after the responsible one.
    pub fn replicas_of(&self, key_hash: Position, replicas: usize) -> Vec<NodeInfo> {
        let Ok(primary) = self.responsible(key_hash) else {
            return Vec::new();
        };
        let mut nodes: Vec<NodeInfo> = Vec::new();
        for offset in 1..=replicas.min(self.entries.len().saturating_sub(1)) {
            if let Ok(node) = self.replica(key_hash, offset)
                && node != primary
                && !nodes.contains(node)
            {
                nodes.push(node.clone());
            }
        }
        nodes
    }
}

impl FromIterator<(Position, NodeInfo)> for HashRing {
    fn from_iter<T: IntoIterator<Item = (Position, NodeInfo)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
