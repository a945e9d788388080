//! Flipside live source (JSON-RPC v2 API).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

use hackwatch_core::config::FlipsideConfig;
use hackwatch_core::RawProviderRow;

use super::envelope::{error_message, read_json, rows_at, Backoff};
use super::traits::{ExploitProvider, ProviderError};

const API_KEY_HEADER: &str = "x-api-key";

pub struct FlipsideProvider {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    query: Option<String>,
    page_size: u32,
    timeout: Duration,
    next_request_id: AtomicU64,
}

impl FlipsideProvider {
    pub fn new(client: reqwest::Client, config: &FlipsideConfig) -> Self {
        Self {
            client,
            endpoint: format!("{}/json-rpc", config.api_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            query: config.query.clone(),
            page_size: config.page_size,
            timeout: Duration::from_secs(config.timeout_secs),
            next_request_id: AtomicU64::new(1),
        }
    }

    /// Send one JSON-RPC call and return the full response body.
    async fn call(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Unauthenticated("FLIPSIDE_API_KEY is not set".into()))?;

        let request = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": [params],
            "id": self.next_request_id.fetch_add(1, Ordering::Relaxed),
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header(API_KEY_HEADER, api_key)
            .json(&request)
            .send()
            .await?;
        let body = read_json(self.name(), response).await?;

        if let Some(message) = error_message(&body) {
            return Err(ProviderError::Upstream(format!("{method}: {message}")));
        }
        Ok(body)
    }

    async fn create_query_run(&self, sql: &str) -> Result<String, ProviderError> {
        let body = self
            .call(
                "createQueryRun",
                json!({
                    "resultTTLHours": 1,
                    "maxAgeMinutes": 0,
                    "sql": sql,
                    "tags": {"source": "hackwatch"},
                    "dataSource": "snowflake-default",
                    "dataProvider": "flipside",
                }),
            )
            .await?;

        body.pointer("/result/queryRun/id")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ProviderError::MalformedEnvelope("createQueryRun returned no queryRun id".into()))
    }

    async fn wait_for_success(&self, run_id: &str) -> Result<(), ProviderError> {
        let start = Instant::now();
        let mut backoff = Backoff::new();

        loop {
            let body = self.call("getQueryRun", json!({"queryRunId": run_id})).await?;
            let state = body
                .pointer("/result/queryRun/state")
                .and_then(Value::as_str)
                .unwrap_or("QUERY_STATE_READY");

            debug!(run_id = %run_id, state = %state, "Polling Flipside query run");

            match state {
                "QUERY_STATE_SUCCESS" => return Ok(()),
                "QUERY_STATE_FAILED" | "QUERY_STATE_CANCELED" => {
                    let reason = body
                        .pointer("/result/queryRun/errorMessage")
                        .and_then(Value::as_str)
                        .unwrap_or(state);
                    return Err(ProviderError::Upstream(format!(
                        "flipside query run {run_id} ended in {state}: {reason}"
                    )));
                }
                _ => {}
            }

            if start.elapsed() > self.timeout {
                warn!(run_id = %run_id, timeout_seconds = self.timeout.as_secs(), "Flipside query run timed out");
                return Err(ProviderError::Timeout {
                    query_id: run_id.to_string(),
                    seconds: self.timeout.as_secs(),
                });
            }

            tokio::time::sleep(backoff.next_delay()).await;
        }
    }
}

#[async_trait]
impl ExploitProvider for FlipsideProvider {
    async fn fetch(&self) -> Result<Vec<RawProviderRow>, ProviderError> {
        let sql = self
            .query
            .as_deref()
            .ok_or_else(|| ProviderError::Upstream("FLIPSIDE_QUERY is not configured".into()))?;

        let run_id = self.create_query_run(sql).await?;
        self.wait_for_success(&run_id).await?;

        let body = self
            .call(
                "getQueryRunResults",
                json!({
                    "queryRunId": run_id,
                    "format": "json",
                    "page": {"number": 1, "size": self.page_size},
                }),
            )
            .await?;
        rows_at(&body, "/result/rows")
    }

    fn name(&self) -> &str {
        "flipside"
    }
}
