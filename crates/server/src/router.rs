//! Health and ingestion status probe. Serves no exploit data.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;

use hackwatch_ingest::{PollingScheduler, SchedulerStatus};

pub struct AppState {
    /// `None` when background services are disabled.
    pub scheduler: Option<Arc<PollingScheduler>>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Serialize)]
pub struct IngestionStatusResponse {
    pub services_enabled: bool,
    pub scheduler: Option<SchedulerStatus>,
}

pub fn build(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ingestion/status", get(ingestion_status))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn ingestion_status(State(state): State<Arc<AppState>>) -> Json<IngestionStatusResponse> {
    Json(IngestionStatusResponse {
        services_enabled: state.scheduler.is_some(),
        scheduler: state.scheduler.as_ref().map(|s| s.status()),
    })
}
