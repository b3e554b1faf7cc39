use parking_lot::RwLock;
use std::sync::Arc;

use super::hash_ring::HashRing;
use super::types::Position;

/// Holder for the current ring snapshot.
///
/// Readers clone the `Arc` and keep working on that snapshot; writers replace the whole
/// snapshot. Nobody ever observes a ring halfway through an update.
#[derive(Debug, Default)]
pub struct RingCache {
    current: RwLock<Arc<HashRing>>,
}

impl RingCache {
    pub fn new(ring: HashRing) -> Self {
        Self {
            current: RwLock::new(Arc::new(ring)),
        }
    }

    pub fn snapshot(&self) -> Arc<HashRing> {
        self.current.read().clone()
    }

    /// Installs `ring` and returns the snapshot it replaced.
    pub fn replace(&self, ring: HashRing) -> Arc<HashRing> {
        std::mem::replace(&mut *self.current.write(), Arc::new(ring))
    }

    /// Drops the entry at `position` and returns the reduced snapshot.
    pub fn remove(&self, position: Position) -> Arc<HashRing> {
        let mut current = self.current.write();
        let reduced = Arc::new(current.without(position));
        *current = reduced.clone();
        reduced
    }

    pub fn is_empty(&self) -> bool {
        self.current.read().is_empty()
    }
}
