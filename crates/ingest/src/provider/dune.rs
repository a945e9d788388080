//! Dune Analytics bulk source.
//!
//! Runs a saved query to completion and pages through its results:
//! 1. `POST /api/v1/query/{id}/execute`
//! 2. poll `GET /api/v1/execution/{eid}/status` until a terminal state
//! 3. `GET /api/v1/execution/{eid}/results` following `next_offset`

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use hackwatch_core::config::DuneConfig;
use hackwatch_core::RawProviderRow;

use super::envelope::{error_message, read_json, rows_at, Backoff};
use super::traits::{ExploitProvider, ProviderError};

const API_KEY_HEADER: &str = "X-Dune-API-Key";
const RESULTS_PAGE_LIMIT: u64 = 10_000;

pub struct DuneProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: Option<String>,
    query_id: u64,
    timeout: Duration,
}

impl DuneProvider {
    pub fn new(client: reqwest::Client, config: &DuneConfig) -> Self {
        Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            query_id: config.query_id,
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    fn api_key(&self) -> Result<&str, ProviderError> {
        self.api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Unauthenticated("DUNE_API_KEY is not set".into()))
    }

    async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<Value, ProviderError> {
        let response = self
            .client
            .get(format!("{}{}", self.api_url, path))
            .header(API_KEY_HEADER, self.api_key()?)
            .query(query)
            .send()
            .await?;
        read_json(self.name(), response).await
    }

    async fn execute(&self) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/api/v1/query/{}/execute", self.api_url, self.query_id))
            .header(API_KEY_HEADER, self.api_key()?)
            .send()
            .await?;
        let body = read_json(self.name(), response).await?;

        if let Some(message) = error_message(&body) {
            return Err(ProviderError::Upstream(message));
        }
        body.get("execution_id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ProviderError::MalformedEnvelope("execute response has no execution_id".into()))
    }

    /// Poll execution status with exponential backoff until it completes,
    /// fails, or exceeds the configured timeout.
    async fn wait_for_completion(&self, execution_id: &str) -> Result<(), ProviderError> {
        let start = Instant::now();
        let mut backoff = Backoff::new();

        loop {
            let body = self
                .get(&format!("/api/v1/execution/{execution_id}/status"), &[])
                .await?;
            let state = body.get("state").and_then(Value::as_str).unwrap_or("QUERY_STATE_PENDING");

            debug!(
                execution_id = %execution_id,
                state = %state,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Polling Dune execution"
            );

            match state {
                "QUERY_STATE_COMPLETED" => return Ok(()),
                "QUERY_STATE_FAILED" | "QUERY_STATE_CANCELLED" | "QUERY_STATE_EXPIRED" => {
                    let reason = error_message(&body).unwrap_or_else(|| state.to_string());
                    error!(execution_id = %execution_id, reason = %reason, "Dune execution did not complete");
                    return Err(ProviderError::Upstream(format!(
                        "dune execution {execution_id} ended in {state}: {reason}"
                    )));
                }
                _ => {}
            }

            if start.elapsed() > self.timeout {
                warn!(
                    execution_id = %execution_id,
                    timeout_seconds = self.timeout.as_secs(),
                    "Dune execution timed out"
                );
                return Err(ProviderError::Timeout {
                    query_id: execution_id.to_string(),
                    seconds: self.timeout.as_secs(),
                });
            }

            tokio::time::sleep(backoff.next_delay()).await;
        }
    }

    async fn results(&self, execution_id: &str) -> Result<Vec<RawProviderRow>, ProviderError> {
        let path = format!("/api/v1/execution/{execution_id}/results");
        let mut rows = Vec::new();
        let mut offset = 0u64;

        loop {
            let body = self
                .get(
                    &path,
                    &[
                        ("limit", RESULTS_PAGE_LIMIT.to_string()),
                        ("offset", offset.to_string()),
                    ],
                )
                .await?;
            rows.extend(rows_at(&body, "/result/rows")?);

            match body.get("next_offset").and_then(Value::as_u64) {
                Some(next) if next > offset => offset = next,
                _ => break,
            }
        }
        Ok(rows)
    }
}

#[async_trait]
impl ExploitProvider for DuneProvider {
    async fn fetch(&self) -> Result<Vec<RawProviderRow>, ProviderError> {
        let execution_id = self.execute().await?;
        info!(query_id = self.query_id, execution_id = %execution_id, "Dune query execution started");

        self.wait_for_completion(&execution_id).await?;
        let rows = self.results(&execution_id).await?;

        info!(
            query_id = self.query_id,
            execution_id = %execution_id,
            rows = rows.len(),
            "Dune results fetched"
        );
        Ok(rows)
    }

    fn name(&self) -> &str {
        "dune"
    }
}
