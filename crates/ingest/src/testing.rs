//! Provider fake shared by the unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use hackwatch_core::RawProviderRow;

use crate::provider::{ExploitProvider, ProviderError};

#[derive(Default)]
pub(crate) struct FakeProvider {
    rows: Vec<RawProviderRow>,
    failure: Mutex<Option<String>>,
    delay: Option<Duration>,
    fetch_calls: AtomicUsize,
}

impl FakeProvider {
    pub(crate) fn with_rows(rows: Vec<RawProviderRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub(crate) fn failing(message: &str) -> Self {
        let provider = Self::default();
        provider.set_failure(Some(message));
        provider
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn set_failure(&self, message: Option<&str>) {
        *self.failure.lock().unwrap() = message.map(String::from);
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExploitProvider for FakeProvider {
    async fn fetch(&self) -> Result<Vec<RawProviderRow>, ProviderError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(ProviderError::Upstream(message));
        }
        Ok(self.rows.clone())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// A valid Dune-shaped row.
pub(crate) fn exploit_row(protocol: &str, date: &str, amount: f64) -> RawProviderRow {
    serde_json::from_value(json!({
        "protocol": protocol,
        "hack_date": date,
        "amount_stolen_usd": amount,
        "exploit_type": "Private key compromise",
        "technique": "Phishing",
        "recovered": false
    }))
    .unwrap()
}
