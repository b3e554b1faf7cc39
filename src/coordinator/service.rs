use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::RwLock;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

use crate::ring::{HashRing, NodeInfo, Position};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("position of {node} is already taken by {holder}")]
    PositionTaken { node: NodeInfo, holder: NodeInfo },

    #[error("{0} is not a member")]
    UnknownNode(NodeInfo),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RingSnapshot {
    pub version: u64,
    pub ring: Arc<HashRing>,
}

pub struct ClusterCoordinator {
    members: DashMap<Position, NodeInfo>,
    current: RwLock<RingSnapshot>,
}

impl ClusterCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            members: DashMap::new(),
            current: RwLock::new(RingSnapshot::default()),
        })
    }

    /// Adds `node` and publishes a new snapshot. Joining twice is a no-op that returns the
    /// current snapshot.
    pub fn join(&self, node: NodeInfo) -> Result<RingSnapshot, CoordinatorError> {
        self.join_at(node.position(), node)
    }

    pub(crate) fn join_at(
        &self,
        position: Position,
        node: NodeInfo,
    ) -> Result<RingSnapshot, CoordinatorError> {
        match self.members.entry(position) {
            Entry::Occupied(existing) if *existing.get() == node => {
                info!("Node {} joined again, ring unchanged", node);
                return Ok(self.snapshot());
            }
            Entry::Occupied(existing) => {
                return Err(CoordinatorError::PositionTaken {
                    node,
                    holder: existing.get().clone(),
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(node.clone());
            }
        }

        let snapshot = self.publish();
        info!(
            "Node {} joined at {}, cluster size now: {} (ring v{})",
            node,
            position,
            snapshot.ring.len(),
            snapshot.version
        );
        Ok(snapshot)
    }

    pub fn leave(&self, node: &NodeInfo) -> Result<RingSnapshot, CoordinatorError> {
        let position = self
            .members
            .iter()
            .find(|entry| entry.value() == node)
            .map(|entry| *entry.key());
        let removed = position
            .and_then(|position| self.members.remove_if(&position, |_, member| member == node));
        if removed.is_none() {
            return Err(CoordinatorError::UnknownNode(node.clone()));
        }

        let snapshot = self.publish();
        info!(
            "Node {} left, cluster size now: {} (ring v{})",
            node,
            snapshot.ring.len(),
            snapshot.version
        );
        Ok(snapshot)
    }

    pub fn snapshot(&self) -> RingSnapshot {
        self.current.read().clone()
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Rebuilds the ring from the member set under the snapshot lock, so versions and contents
    /// advance together.
    fn publish(&self) -> RingSnapshot {
        let mut current = self.current.write();
        let ring: HashRing = self
            .members
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        *current = RingSnapshot {
            version: current.version + 1,
            ring: Arc::new(ring),
        };
        current.clone()
    }
}
