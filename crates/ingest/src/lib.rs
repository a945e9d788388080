//! Exploit ingestion: provider adapters, row transformer, batch writer,
//! polling scheduler and bootstrap seeder.

pub mod batch;
pub mod pipeline;
pub mod provider;
pub mod scheduler;
pub mod seeder;
pub mod transform;

#[cfg(test)]
pub(crate) mod testing;

pub use batch::BatchProcessor;
pub use pipeline::{CycleError, CycleReport, IngestPipeline};
pub use provider::{bulk_provider, live_provider, ExploitProvider, ProviderError};
pub use scheduler::{PollingScheduler, SchedulerState, SchedulerStatus};
pub use seeder::{start_services, BootstrapSeeder, SeedOutcome};
pub use transform::{coerce_recovered, transform, transform_batch, TransformOutcome};
