use std::sync::Arc;

use tracing::debug;

use hackwatch_core::NewExploit;
use hackwatch_storage::{ExploitStore, PersistenceError};

/// Writes canonical records in bounded chunks, skipping dedup-key collisions.
///
/// Duplicates are absorbed by storage (`create_many(.., true)`) rather than
/// pre-checked, so overlapping snapshots can be re-ingested safely.
pub struct BatchProcessor {
    store: Arc<dyn ExploitStore>,
    batch_size: usize,
}

impl BatchProcessor {
    pub fn new(store: Arc<dyn ExploitStore>, batch_size: usize) -> Self {
        Self {
            store,
            batch_size: batch_size.max(1),
        }
    }

    pub fn store(&self) -> &Arc<dyn ExploitStore> {
        &self.store
    }

    /// Persist `records`, returning how many were newly inserted.
    ///
    /// Empty input returns 0 without contacting storage.
    pub async fn persist(&self, records: &[NewExploit]) -> Result<u64, PersistenceError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0u64;
        for (index, chunk) in records.chunks(self.batch_size).enumerate() {
            let written = self.store.create_many(chunk, true).await?;
            debug!(
                chunk = index,
                size = chunk.len(),
                inserted = written,
                skipped = chunk.len() as u64 - written.min(chunk.len() as u64),
                "Batch chunk persisted"
            );
            inserted += written;
        }
        Ok(inserted)
    }
}
