//! Internal HTTP Helpers
//!
//! Retry loops shared by every node-to-node and node-to-coordinator call. Only transport
//! failures are retried; any HTTP response (including error statuses) is returned to the caller.

use anyhow::Result;
use std::time::Duration;

const INITIAL_DELAY_MS: u64 = 150;
const MAX_DELAY_MS: u64 = 1200;

pub async fn post_with_retry<T: serde::Serialize>(
    http: &reqwest::Client,
    url: &str,
    payload: &T,
    timeout: Duration,
    attempts: usize,
) -> Result<reqwest::Response> {
    let mut delay_ms = INITIAL_DELAY_MS;

    for attempt in 0..attempts {
        let response = http.post(url).json(payload).timeout(timeout).send().await;

        match response {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                if attempt + 1 == attempts {
                    return Err(anyhow::anyhow!(e));
                }
                tracing::debug!("POST {} failed (attempt {}): {}", url, attempt + 1, e);
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }

    Err(anyhow::anyhow!("Retry attempts exhausted"))
}

pub async fn get_with_retry(
    http: &reqwest::Client,
    url: &str,
    timeout: Duration,
    attempts: usize,
) -> Result<reqwest::Response> {
    let mut delay_ms = INITIAL_DELAY_MS;

    for attempt in 0..attempts {
        let response = http.get(url).timeout(timeout).send().await;

        match response {
            Ok(resp) => return Ok(resp),
            Err(e) => {
                if attempt + 1 == attempts {
                    return Err(anyhow::anyhow!(e));
                }
                tracing::debug!("GET {} failed (attempt {}): {}", url, attempt + 1, e);
                let jitter = rand::random::<u64>() % 50;
                tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                delay_ms = (delay_ms * 2).min(MAX_DELAY_MS);
            }
        }
    }

    Err(anyhow::anyhow!("Retry attempts exhausted"))
}
