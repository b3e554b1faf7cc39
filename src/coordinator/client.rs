use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

use super::protocol::{ENDPOINT_JOIN, ENDPOINT_LEAVE, ENDPOINT_RING, RingResponse};
use super::service::RingSnapshot;
use crate::http::{get_with_retry, post_with_retry};
use crate::ring::{HashRing, NodeInfo, codec};

const REQUEST_TIMEOUT: Duration = Duration::from_millis(1000);
const ATTEMPTS: usize = 3;

/// HTTP client for the coordinator API.
#[derive(Debug, Clone)]
pub struct CoordinatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl CoordinatorClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub async fn join(&self, node: &NodeInfo) -> Result<RingSnapshot> {
        self.post_membership(ENDPOINT_JOIN, node).await
    }

    pub async fn leave(&self, node: &NodeInfo) -> Result<RingSnapshot> {
        self.post_membership(ENDPOINT_LEAVE, node).await
    }

    pub async fn ring(&self) -> Result<RingSnapshot> {
        let url = format!("{}{}", self.base_url, ENDPOINT_RING);
        let response = get_with_retry(&self.http, &url, REQUEST_TIMEOUT, ATTEMPTS).await?;
        if !response.status().is_success() {
            return Err(anyhow::anyhow!("GET {} failed {}", url, response.status()));
        }
        to_snapshot(response.json().await?)
    }

    async fn post_membership(&self, endpoint: &str, node: &NodeInfo) -> Result<RingSnapshot> {
        let url = format!("{}{}", self.base_url, endpoint);
        let response = post_with_retry(&self.http, &url, node, REQUEST_TIMEOUT, ATTEMPTS).await?;
        let status = response.status();
        let body: RingResponse = response.json().await?;
        if !status.is_success() {
            return Err(anyhow::anyhow!(
                "{} refused ({}): {}",
                endpoint,
                status,
                body.error.unwrap_or_default()
            ));
        }
        to_snapshot(body)
    }
}

fn to_snapshot(body: RingResponse) -> Result<RingSnapshot> {
    let ring = if body.ring.trim().is_empty() {
        HashRing::new()
    } else {
        codec::decode(&body.ring)?
    };
    Ok(RingSnapshot {
        version: body.version,
        ring: Arc::new(ring),
    })
}
