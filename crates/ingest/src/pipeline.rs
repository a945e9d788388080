//! One ingestion cycle: fetch → transform → persist, strictly in that order.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use hackwatch_storage::PersistenceError;

use crate::batch::BatchProcessor;
use crate::provider::{ExploitProvider, ProviderError};
use crate::transform::transform_batch;

#[derive(Debug, Error)]
pub enum CycleError {
    #[error("provider fetch failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("persist failed: {0}")]
    Persistence(#[from] PersistenceError),
}

/// Counts from a completed cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    /// Name of the provider the rows came from.
    pub source: String,
    pub fetched: usize,
    pub valid: usize,
    pub rejected: usize,
    pub inserted: u64,
    pub duration_ms: u64,
    pub started_at: DateTime<Utc>,
}

pub struct IngestPipeline {
    processor: BatchProcessor,
}

impl IngestPipeline {
    pub fn new(processor: BatchProcessor) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &BatchProcessor {
        &self.processor
    }

    /// Run one cycle against `provider`. Row rejects are counted, never raised.
    pub async fn run_cycle(&self, provider: &dyn ExploitProvider) -> Result<CycleReport, CycleError> {
        let cycle_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        let rows = provider.fetch().await?;
        let fetched = rows.len();

        let outcome = transform_batch(rows);
        let inserted = self.processor.persist(&outcome.records).await?;

        let report = CycleReport {
            cycle_id,
            source: provider.name().to_string(),
            fetched,
            valid: outcome.records.len(),
            rejected: outcome.rejected.len(),
            inserted,
            duration_ms: start.elapsed().as_millis() as u64,
            started_at,
        };

        info!(
            cycle_id = %report.cycle_id,
            source = %report.source,
            fetched = report.fetched,
            valid = report.valid,
            rejected = report.rejected,
            inserted = report.inserted,
            duration_ms = report.duration_ms,
            "Ingestion cycle complete"
        );
        Ok(report)
    }
}
