use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::replication::Replicator;
use super::status::{ServerStatus, StatusCell};
use crate::coordinator::{CoordinatorClient, RingSnapshot};
use crate::ring::{HashRing, NodeInfo, Position, REPLICATION_FACTOR, RingCache};
use crate::storage::{KvStore, Record};

/// Keeps a node's ring in sync with the coordinator and moves entries to their new owners
/// after every ring change.
pub struct Rebalancer {
    node: NodeInfo,
    store: Arc<KvStore>,
    ring: Arc<RingCache>,
    status: Arc<StatusCell>,
    replicator: Replicator,
}

impl Rebalancer {
    pub fn new(
        node: NodeInfo,
        store: Arc<KvStore>,
        ring: Arc<RingCache>,
        status: Arc<StatusCell>,
        replicator: Replicator,
    ) -> Arc<Self> {
        Arc::new(Self {
            node,
            store,
            ring,
            status,
            replicator,
        })
    }

    /// Polls the coordinator every `interval`, installing each newer ring version.
    /// `installed` is the version already in place when the loop starts.
    pub async fn run(
        self: Arc<Self>,
        coordinator: CoordinatorClient,
        interval: Duration,
        mut installed: u64,
    ) {
        let mut ticker = tokio::time::interval(interval);

        loop {
            ticker.tick().await;

            match coordinator.ring().await {
                Ok(snapshot) if snapshot.version > installed => {
                    let version = snapshot.version;
                    match self.install(snapshot).await {
                        Ok(moved) => {
                            tracing::info!("Installed ring v{}, handed off {} entries", version, moved);
                            installed = version;
                        }
                        Err(e) => tracing::error!("Failed to install ring v{}: {}", version, e),
                    }
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Failed to poll coordinator: {}", e),
            }
        }
    }

    /// Installs `snapshot` and moves entries to the nodes that own them under it.
    ///
    /// Entries outside this node's new read interval are handed to their responsible node and
    /// dropped here; batches that could not be delivered are put back into the local store.
    /// Entries this node owned before and still serves as a replica are copied to their new
    /// responsible node and its replicas. Writes are refused meanwhile. Returns the number of
    /// entries sent.
    pub async fn install(&self, snapshot: RingSnapshot) -> Result<usize> {
        let ring = snapshot.ring.as_ref().clone();
        let member = ring.position_of(&self.node).is_some();

        if ring.is_empty() {
            self.ring.replace(ring);
            self.status.set(ServerStatus::Stopped);
            return Ok(0);
        }

        self.status.set(ServerStatus::WriteLock);
        let previous = self.ring.replace(ring.clone());
        let result = self.hand_off(&previous, &ring).await;
        self.status.set(if member {
            ServerStatus::Active
        } else {
            ServerStatus::Stopped
        });
        result
    }

    async fn hand_off(&self, previous: &HashRing, ring: &HashRing) -> Result<usize> {
        let node = &self.node;
        let extracted = self
            .store
            .extract_where(|hash| !ring.is_read_responsible(node, hash, REPLICATION_FACTOR))
            .await?;
        let passed_on = self
            .store
            .entries_where(|hash| previous.is_responsible(node, hash) && !ring.is_responsible(node, hash))
            .await;

        let mut owners: HashMap<NodeInfo, Vec<(String, Record)>> = HashMap::new();
        let mut copies: HashMap<NodeInfo, Vec<(String, Record)>> = HashMap::new();
        for (key, record) in extracted {
            let hash = Position::of_key(&key);
            let owner = ring.responsible(hash)?.clone();
            if previous.is_responsible(node, hash) {
                for replica in ring.replicas_of(hash, REPLICATION_FACTOR) {
                    if replica != *node {
                        copies.entry(replica).or_default().push((key.clone(), record.clone()));
                    }
                }
            }
            owners.entry(owner).or_default().push((key, record));
        }
        for (key, record) in passed_on {
            let hash = Position::of_key(&key);
            let owner = ring.responsible(hash)?.clone();
            for target in std::iter::once(owner).chain(ring.replicas_of(hash, REPLICATION_FACTOR)) {
                if target != *node {
                    copies.entry(target).or_default().push((key.clone(), record.clone()));
                }
            }
        }

        let mut sent = 0;
        for (target, batch) in owners {
            match self.replicator.transfer(&target, &batch).await {
                Ok(_) => {
                    tracing::info!("Handed off {} entries to {}", batch.len(), target);
                    sent += batch.len();
                }
                Err(e) => {
                    tracing::error!(
                        "Hand-off of {} entries to {} failed, keeping them: {}",
                        batch.len(),
                        target,
                        e
                    );
                    self.store.insert_entries(batch).await?;
                }
            }
        }
        for (target, batch) in copies {
            match self.replicator.transfer(&target, &batch).await {
                Ok(_) => {
                    tracing::info!("Copied {} entries to {}", batch.len(), target);
                    sent += batch.len();
                }
                Err(e) => tracing::warn!("Copy of {} entries to {} failed: {}", batch.len(), target, e),
            }
        }

        self.store.compact().await?;
        Ok(sent)
    }
}
