//! The persistence contract the ingestion pipeline relies on.

use async_trait::async_trait;

use hackwatch_core::NewExploit;

use crate::error::PersistenceError;

/// Exploit storage as seen by the pipeline: count and bulk create.
///
/// Implementations must be safe to share between the scheduler, the seeder
/// and any other writer without external locking.
#[async_trait]
pub trait ExploitStore: Send + Sync {
    /// Number of persisted exploit records.
    async fn count(&self) -> Result<u64, PersistenceError>;

    /// Insert `records` and return how many rows were actually written.
    ///
    /// With `skip_duplicates`, rows whose dedup key already exists (in storage
    /// or earlier in the same call) are ignored instead of failing the batch.
    async fn create_many(
        &self,
        records: &[NewExploit],
        skip_duplicates: bool,
    ) -> Result<u64, PersistenceError>;
}
