//! Node-to-Node Replication
//!
//! Internal HTTP API (served on the client port + 1000) used to copy successful writes to the
//! replicas of a key and to hand entries over to their new owner after a ring change.
//! Values travel hex-encoded inside JSON, password hashes travel as stored.

use anyhow::Result;
use axum::{Json, Router, extract::Extension, http::StatusCode, routing::post};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::config::internal_port;
use crate::http::post_with_retry;
use crate::ring::NodeInfo;
use crate::storage::{KvStore, Record};

// --- API Endpoints ---

/// Applies a single write forwarded by the key's primary.
pub const ENDPOINT_REPLICATE: &str = "/internal/replicate";
/// Bulk insert of entries handed off after a ring change.
pub const ENDPOINT_TRANSFER: &str = "/internal/transfer";

const REPLICATE_TIMEOUT: Duration = Duration::from_millis(500);
const TRANSFER_TIMEOUT: Duration = Duration::from_secs(5);
const ATTEMPTS: usize = 3;

// --- Data Transfer Objects ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryJson {
    pub key: String,
    pub value_hex: String,
    pub password: Option<String>,
}

impl EntryJson {
    pub fn new(key: &str, record: &Record) -> Self {
        Self {
            key: key.to_string(),
            value_hex: hex::encode(&record.value),
            password: record.password.clone(),
        }
    }

    pub fn into_entry(self) -> Result<(String, Record)> {
        let value = hex::decode(&self.value_hex)?;
        Ok((self.key, Record::new(value, self.password)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ReplicateRequest {
    Put { entry: EntryJson },
    Delete { key: String },
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TransferRequest {
    pub entries: Vec<EntryJson>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AckResponse {
    pub success: bool,
    pub applied: usize,
}

// --- Client side ---

/// Sends writes and hand-off batches to other nodes' internal API.
///
/// Replicated writes are queued per target and delivered one at a time by a worker task, so a
/// replica applies them in the order the primary accepted them.
#[derive(Debug, Clone, Default)]
pub struct Replicator {
    http: reqwest::Client,
    queues: Arc<DashMap<NodeInfo, mpsc::UnboundedSender<ReplicateRequest>>>,
}

impl Replicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `request` for `target`. Delivery failures are logged by the worker.
    pub fn enqueue(&self, target: &NodeInfo, request: ReplicateRequest) {
        let queue = self
            .queues
            .entry(target.clone())
            .or_insert_with(|| self.spawn_worker(target.clone()));
        if queue.send(request).is_err() {
            tracing::error!("Replication queue for {} is closed, dropping write", target);
        }
    }

    fn spawn_worker(&self, target: NodeInfo) -> mpsc::UnboundedSender<ReplicateRequest> {
        let (tx, mut rx) = mpsc::unbounded_channel::<ReplicateRequest>();
        let http = self.http.clone();
        tokio::spawn(async move {
            while let Some(request) = rx.recv().await {
                if let Err(e) = replicate(&http, &target, &request).await {
                    tracing::warn!("Replication to {} failed: {}", target, e);
                }
            }
        });
        tx
    }

    /// Hands `entries` to `target`. Returns how many it stored.
    pub async fn transfer(&self, target: &NodeInfo, entries: &[(String, Record)]) -> Result<usize> {
        let url = internal_url(target, ENDPOINT_TRANSFER)?;
        let payload = TransferRequest {
            entries: entries
                .iter()
                .map(|(key, record)| EntryJson::new(key, record))
                .collect(),
        };
        let response =
            post_with_retry(&self.http, &url, &payload, TRANSFER_TIMEOUT, ATTEMPTS).await?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Transfer to {} failed {}", target, response.status()));
        }
        let ack: AckResponse = response.json().await?;
        Ok(ack.applied)
    }
}

async fn replicate(http: &reqwest::Client, target: &NodeInfo, request: &ReplicateRequest) -> Result<()> {
    let url = internal_url(target, ENDPOINT_REPLICATE)?;
    let response = post_with_retry(http, &url, request, REPLICATE_TIMEOUT, ATTEMPTS).await?;
    if !response.status().is_success() {
        return Err(anyhow::anyhow!("Replicate to {} failed {}", target, response.status()));
    }
    Ok(())
}

fn internal_url(target: &NodeInfo, endpoint: &str) -> Result<String> {
    let port = internal_port(target.port)
        .ok_or_else(|| anyhow::anyhow!("{} has no internal port", target))?;
    Ok(format!("http://{}:{}{}", target.address, port, endpoint))
}

// --- Server side ---

pub fn internal_router(store: Arc<KvStore>) -> Router {
    Router::new()
        .route(ENDPOINT_REPLICATE, post(handle_replicate))
        .route(ENDPOINT_TRANSFER, post(handle_transfer))
        .layer(Extension(store))
}

pub async fn handle_replicate(
    Extension(store): Extension<Arc<KvStore>>,
    Json(req): Json<ReplicateRequest>,
) -> (StatusCode, Json<AckResponse>) {
    let result = match req {
        ReplicateRequest::Put { entry } => match entry.into_entry() {
            Ok(entry) => store.insert_entries(vec![entry]).await.map_err(anyhow::Error::from),
            Err(e) => {
                tracing::error!("Failed to decode replicated entry: {}", e);
                return (StatusCode::BAD_REQUEST, Json(nack()));
            }
        },
        ReplicateRequest::Delete { key } => store
            .remove(&key)
            .await
            .map(usize::from)
            .map_err(anyhow::Error::from),
    };

    match result {
        Ok(applied) => (
            StatusCode::OK,
            Json(AckResponse {
                success: true,
                applied,
            }),
        ),
        Err(e) => {
            tracing::error!("Failed to apply replicated write: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(nack()))
        }
    }
}

pub async fn handle_transfer(
    Extension(store): Extension<Arc<KvStore>>,
    Json(req): Json<TransferRequest>,
) -> (StatusCode, Json<AckResponse>) {
    let entries: Result<Vec<_>> = req.entries.into_iter().map(EntryJson::into_entry).collect();
    let entries = match entries {
        Ok(entries) => entries,
        Err(e) => {
            tracing::error!("Failed to decode transferred entries: {}", e);
            return (StatusCode::BAD_REQUEST, Json(nack()));
        }
    };

    match store.insert_entries(entries).await {
        Ok(applied) => {
            tracing::info!("Received {} handed-off entries", applied);
            (
                StatusCode::OK,
                Json(AckResponse {
                    success: true,
                    applied,
                }),
            )
        }
        Err(e) => {
            tracing::error!("Failed to store handed-off entries: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, Json(nack()))
        }
    }
}

fn nack() -> AckResponse {
    AckResponse {
        success: false,
        applied: 0,
    }
}
