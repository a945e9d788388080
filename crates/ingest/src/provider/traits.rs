use async_trait::async_trait;
use thiserror::Error;

use hackwatch_core::RawProviderRow;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("malformed response envelope: {0}")]
    MalformedEnvelope(String),

    #[error("query {query_id} did not finish within {seconds}s")]
    Timeout { query_id: String, seconds: u64 },
}

/// A source of raw exploit rows (bulk historical or live polling).
///
/// Adapters only bridge the wire format to [`RawProviderRow`]s; mapping into
/// canonical records happens in the transformer. A well-formed empty response
/// is `Ok(vec![])`, not an error.
#[async_trait]
pub trait ExploitProvider: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawProviderRow>, ProviderError>;

    /// Short name used in logs and status output.
    fn name(&self) -> &str;
}
