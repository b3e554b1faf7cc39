use rand::Rng;

use crate::ring::{HashRing, NodeInfo, Position, REPLICATION_FACTOR, RingError};

/// How many nodes a read may be sent to, depending on the size of the ring.
///
/// Rings larger than `full_fanout_above` spread reads over the primary and all its replicas;
/// rings larger than `pair_fanout_above` use the primary and the first replica; anything
/// smaller reads from the primary only. Candidates are picked uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplicaPolicy {
    pub full_fanout_above: usize,
    pub pair_fanout_above: usize,
}

impl Default for ReplicaPolicy {
    fn default() -> Self {
        Self {
            full_fanout_above: 4,
            pair_fanout_above: 1,
        }
    }
}

impl ReplicaPolicy {
    /// Always read from the responsible node.
    pub fn primary_only() -> Self {
        Self {
            full_fanout_above: usize::MAX,
            pair_fanout_above: usize::MAX,
        }
    }

    pub fn fanout(&self, ring_size: usize) -> usize {
        let fanout = if ring_size > self.full_fanout_above {
            REPLICATION_FACTOR + 1
        } else if ring_size > self.pair_fanout_above {
            2
        } else {
            1
        };
        fanout.min(ring_size.max(1))
    }

    pub fn choose<R: Rng + ?Sized>(
        &self,
        ring: &HashRing,
        key_hash: Position,
        rng: &mut R,
    ) -> Result<NodeInfo, RingError> {
        let offset = rng.gen_range(0..self.fanout(ring.len()));
        ring.replica(key_hash, offset).cloned()
    }
}
