use std::sync::Arc;

use super::replication::{EntryJson, ReplicateRequest, Replicator};
use super::status::{ServerStatus, StatusCell};
use crate::protocol::{Request, Response};
use crate::ring::{NodeInfo, Position, REPLICATION_FACTOR, RingCache, codec};
use crate::storage::{DeleteStatus, GetStatus, KvStore, PutStatus, Record};

/// Executes one request line against the local store.
///
/// Every key request is checked against the installed ring first: reads must fall in this
/// node's read interval (own range plus replicated predecessors), writes in its write interval.
pub struct CommandProcessor {
    node: NodeInfo,
    store: Arc<KvStore>,
    ring: Arc<RingCache>,
    status: Arc<StatusCell>,
    replicator: Replicator,
}

impl CommandProcessor {
    pub fn new(
        node: NodeInfo,
        store: Arc<KvStore>,
        ring: Arc<RingCache>,
        status: Arc<StatusCell>,
        replicator: Replicator,
    ) -> Self {
        Self {
            node,
            store,
            ring,
            status,
            replicator,
        }
    }

    pub fn node(&self) -> &NodeInfo {
        &self.node
    }

    pub async fn process(&self, line: &str) -> Response {
        let request = match Request::parse(line) {
            Ok(request) => request,
            Err(e) => {
                tracing::debug!("Rejected request '{}': {}", line.trim(), e);
                return Response::Error(e.to_string());
            }
        };

        match request {
            Request::KeyRange => self.key_range(false),
            Request::KeyRangeRead => self.key_range(true),
            Request::Get { key, password } => self.get(key, password).await,
            Request::Put {
                key,
                value,
                password,
            } => self.put(key, value, password).await,
            Request::Delete { key, password } => self.delete(key, password).await,
        }
    }

    fn key_range(&self, read: bool) -> Response {
        let ring = self.ring.snapshot();
        if ring.is_empty() {
            return Response::ServerStopped;
        }
        if read {
            Response::KeyRangeRead(codec::encode_read(&ring, REPLICATION_FACTOR))
        } else {
            Response::KeyRange(codec::encode(&ring))
        }
    }

    async fn get(&self, key: String, password: Option<String>) -> Response {
        if self.status.get() == ServerStatus::Stopped {
            return Response::ServerStopped;
        }
        let hash = Position::of_key(&key);
        if !self
            .ring
            .snapshot()
            .is_read_responsible(&self.node, hash, REPLICATION_FACTOR)
        {
            return Response::ServerNotResponsible;
        }

        match self.store.get(&key, password.as_deref()).await {
            GetStatus::Found(value) => Response::GetSuccess { key, value },
            GetStatus::NotFound => Response::GetError { key },
            GetStatus::PasswordMismatch => Response::InvalidPassword,
        }
    }

    async fn put(&self, key: String, value: Vec<u8>, password: Option<String>) -> Response {
        if let Some(refusal) = self.refuse_write(&key) {
            return refusal;
        }

        let record = Record::new(value.clone(), password.clone());
        match self.store.put(&key, value, password).await {
            Ok(PutStatus::Created) => {
                self.replicate(&key, ReplicateRequest::Put {
                    entry: EntryJson::new(&key, &record),
                });
                Response::PutSuccess { key }
            }
            Ok(PutStatus::Updated) => {
                self.replicate(&key, ReplicateRequest::Put {
                    entry: EntryJson::new(&key, &record),
                });
                Response::PutUpdate { key }
            }
            Ok(PutStatus::PasswordMismatch) => Response::InvalidPassword,
            Err(e) => {
                tracing::error!("Failed to store '{}': {}", key, e);
                Response::PutError {
                    key,
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn delete(&self, key: String, password: Option<String>) -> Response {
        if let Some(refusal) = self.refuse_write(&key) {
            return refusal;
        }

        match self.store.delete(&key, password.as_deref()).await {
            Ok(DeleteStatus::Deleted) => {
                self.replicate(&key, ReplicateRequest::Delete { key: key.clone() });
                Response::DeleteSuccess { key }
            }
            Ok(DeleteStatus::NotFound) => Response::DeleteError { key },
            Ok(DeleteStatus::PasswordMismatch) => Response::InvalidPassword,
            Err(e) => {
                tracing::error!("Failed to delete '{}': {}", key, e);
                Response::DeleteError { key }
            }
        }
    }

    fn refuse_write(&self, key: &str) -> Option<Response> {
        match self.status.get() {
            ServerStatus::Stopped => return Some(Response::ServerStopped),
            ServerStatus::WriteLock => return Some(Response::ServerWriteLock),
            ServerStatus::Active => {}
        }
        if !self
            .ring
            .snapshot()
            .is_responsible(&self.node, Position::of_key(key))
        {
            return Some(Response::ServerNotResponsible);
        }
        None
    }

    /// Queues a successful write for the key's replicas. The client is answered without
    /// waiting for them.
    fn replicate(&self, key: &str, request: ReplicateRequest) {
        let replicas = self
            .ring
            .snapshot()
            .replicas_of(Position::of_key(key), REPLICATION_FACTOR);
        for replica in replicas.iter().filter(|replica| **replica != self.node) {
            self.replicator.enqueue(replica, request.clone());
        }
    }
}
