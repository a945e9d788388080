//! Helius live source: a plain GET returning the `{rows}` / `{error}` envelope.

use async_trait::async_trait;
use tracing::debug;

use hackwatch_core::config::HeliusConfig;
use hackwatch_core::RawProviderRow;

use super::envelope::{read_json, rows_at};
use super::traits::{ExploitProvider, ProviderError};

pub struct HeliusProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl HeliusProvider {
    pub fn new(client: reqwest::Client, config: &HeliusConfig) -> Self {
        Self {
            client,
            url: format!(
                "{}/{}",
                config.api_url.trim_end_matches('/'),
                config.source.trim_start_matches('/')
            ),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl ExploitProvider for HeliusProvider {
    async fn fetch(&self) -> Result<Vec<RawProviderRow>, ProviderError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| ProviderError::Unauthenticated("HELIUS_API_KEY is not set".into()))?;

        debug!(url = %self.url, "Fetching Helius exploit rows");
        let response = self
            .client
            .get(&self.url)
            .query(&[("api-key", api_key)])
            .send()
            .await?;

        let body = read_json(self.name(), response).await?;
        rows_at(&body, "/rows")
    }

    fn name(&self) -> &str {
        "helius"
    }
}
