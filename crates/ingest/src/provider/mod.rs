//! Provider adapters: bridge each upstream wire format to [`RawProviderRow`]s.
//!
//! The bulk source (Dune) seeds an empty store once; the live source is
//! chosen by `EXPLOIT_DATA_PROVIDER` and polled by the scheduler.
//!
//! [`RawProviderRow`]: hackwatch_core::RawProviderRow

mod dune;
mod envelope;
mod flipside;
mod helius;
mod traits;

use std::sync::Arc;
use std::time::Duration;

use hackwatch_core::{Config, LiveProviderKind};

pub use dune::DuneProvider;
pub use flipside::FlipsideProvider;
pub use helius::HeliusProvider;
pub use traits::{ExploitProvider, ProviderError};

/// HTTP client shared by an adapter; every request is bounded by `timeout_secs`.
fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("hackwatch/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Build the bulk historical source used by the bootstrap seeder.
pub fn bulk_provider(config: &Config) -> Result<Arc<dyn ExploitProvider>, ProviderError> {
    let client = http_client(config.ingest.provider_timeout_secs)?;
    Ok(Arc::new(DuneProvider::new(client, &config.dune)))
}

/// Build the live source selected by `EXPLOIT_DATA_PROVIDER`.
pub fn live_provider(config: &Config) -> Result<Arc<dyn ExploitProvider>, ProviderError> {
    let client = http_client(config.ingest.provider_timeout_secs)?;
    let provider: Arc<dyn ExploitProvider> = match config.ingest.live_provider {
        LiveProviderKind::Flipside => Arc::new(FlipsideProvider::new(client, &config.flipside)),
        LiveProviderKind::Helius => Arc::new(HeliusProvider::new(client, &config.helius)),
    };
    Ok(provider)
}

#[cfg(test)]
pub(crate) mod test_server {
    use axum::Router;

    /// Serve `app` on an ephemeral local port and return its base URL.
    pub(crate) async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }
}
