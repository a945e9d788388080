use std::sync::Arc;

use tracing::{error, info};

use crate::pipeline::{CycleReport, IngestPipeline};
use crate::provider::ExploitProvider;
use crate::scheduler::PollingScheduler;

#[derive(Debug)]
pub enum SeedOutcome {
    /// Storage already held records; the bulk source was not contacted.
    Skipped { existing: u64 },
    Seeded(CycleReport),
    /// Logged and non-fatal; the scheduler starts regardless.
    Failed(String),
}

/// One-time bulk load, run before the scheduler when storage is empty.
pub struct BootstrapSeeder {
    pipeline: Arc<IngestPipeline>,
    provider: Arc<dyn ExploitProvider>,
}

impl BootstrapSeeder {
    pub fn new(pipeline: Arc<IngestPipeline>, provider: Arc<dyn ExploitProvider>) -> Self {
        Self { pipeline, provider }
    }

    /// Seed only if storage holds zero records.
    pub async fn run(&self) -> SeedOutcome {
        let existing = match self.pipeline.processor().store().count().await {
            Ok(n) => n,
            Err(e) => {
                error!(error = %e, "Could not count existing exploits, skipping bootstrap seed");
                return SeedOutcome::Failed(e.to_string());
            }
        };

        if existing > 0 {
            info!(existing, "Storage already populated, skipping bootstrap seed");
            return SeedOutcome::Skipped { existing };
        }

        self.force().await
    }

    /// Run the bulk load regardless of what storage holds.
    pub async fn force(&self) -> SeedOutcome {
        info!(provider = %self.provider.name(), "Bootstrap seed starting");
        match self.pipeline.run_cycle(self.provider.as_ref()).await {
            Ok(report) => {
                info!(
                    inserted = report.inserted,
                    rejected = report.rejected,
                    "Bootstrap seed complete"
                );
                SeedOutcome::Seeded(report)
            }
            Err(e) => {
                error!(provider = %self.provider.name(), error = %e, "Bootstrap seed failed");
                SeedOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Seed if empty, then start polling. The scheduler starts whatever the
/// seed outcome, and never before the seed has finished.
pub async fn start_services(seeder: &BootstrapSeeder, scheduler: &PollingScheduler) -> SeedOutcome {
    let outcome = seeder.run().await;
    if let SeedOutcome::Failed(reason) = &outcome {
        info!(reason = %reason, "Starting live polling despite failed bootstrap seed");
    }
    scheduler.start();
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::BatchProcessor;
    use crate::testing::{exploit_row, FakeProvider};
    use chrono::{TimeZone, Utc};
    use hackwatch_core::NewExploit;
    use hackwatch_storage::InMemoryExploitStore;
    use std::time::Duration;

    fn seeder(store: Arc<InMemoryExploitStore>, provider: Arc<FakeProvider>) -> BootstrapSeeder {
        let pipeline = Arc::new(IngestPipeline::new(BatchProcessor::new(store, 500)));
        BootstrapSeeder::new(pipeline, provider)
    }

    fn bulk_provider() -> Arc<FakeProvider> {
        Arc::new(FakeProvider::with_rows(vec![
            exploit_row("Poly Network", "2021-08-10", 611_000_000.0),
            exploit_row("BNB Bridge", "2022-10-06", 586_000_000.0),
        ]))
    }

    #[tokio::test]
    async fn seeds_empty_store() {
        let store = Arc::new(InMemoryExploitStore::new());
        let outcome = seeder(store.clone(), bulk_provider()).run().await;

        match outcome {
            SeedOutcome::Seeded(report) => assert_eq!(report.inserted, 2),
            other => panic!("expected Seeded, got {other:?}"),
        }
        assert_eq!(store.rows().len(), 2);
    }

    #[tokio::test]
    async fn populated_store_is_left_alone() {
        let store = Arc::new(InMemoryExploitStore::new());
        let counter = store.clone();
        store.preload(&[NewExploit {
            protocol: "Existing".into(),
            hack_date: Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            amount_stolen: 1.0,
            exploit_type: String::new(),
            technique: String::new(),
            related_entity: None,
            recovered: false,
            resolution: None,
            audited_by: None,
            notes: None,
        }]);
        let provider = bulk_provider();

        let outcome = seeder(store, provider.clone()).run().await;
        assert!(matches!(outcome, SeedOutcome::Skipped { existing: 1 }));
        assert_eq!(provider.fetch_calls(), 0);
        assert_eq!(counter.count_calls(), 1);
    }

    #[tokio::test]
    async fn force_seeds_populated_store() {
        let store = Arc::new(InMemoryExploitStore::new());
        let provider = bulk_provider();
        let seeder = seeder(store.clone(), provider.clone());

        seeder.run().await;
        let outcome = seeder.force().await;

        assert!(matches!(outcome, SeedOutcome::Seeded(ref r) if r.inserted == 0));
        assert_eq!(provider.fetch_calls(), 2);
    }

    #[tokio::test]
    async fn provider_failure_is_non_fatal() {
        let store = Arc::new(InMemoryExploitStore::new());
        let provider = Arc::new(FakeProvider::failing("dune 503"));

        let outcome = seeder(store.clone(), provider).run().await;
        assert!(matches!(outcome, SeedOutcome::Failed(ref m) if m.contains("dune 503")));
        assert!(store.rows().is_empty());
    }

    fn services(
        store: Arc<InMemoryExploitStore>,
        bulk: Arc<FakeProvider>,
        live: Arc<FakeProvider>,
    ) -> (BootstrapSeeder, PollingScheduler) {
        let pipeline = Arc::new(IngestPipeline::new(BatchProcessor::new(store, 500)));
        let seeder = BootstrapSeeder::new(pipeline.clone(), bulk);
        let scheduler = PollingScheduler::new(pipeline, live, Duration::from_secs(15));
        (seeder, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_starts_after_failed_seed() {
        let store = Arc::new(InMemoryExploitStore::new());
        let bulk = Arc::new(FakeProvider::failing("dune execution failed"));
        let live = Arc::new(FakeProvider::with_rows(vec![exploit_row(
            "Orbit Bridge",
            "2024-01-01",
            81_500_000.0,
        )]));
        let (seeder, scheduler) = services(store.clone(), bulk.clone(), live.clone());

        let outcome = start_services(&seeder, &scheduler).await;
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(matches!(outcome, SeedOutcome::Failed(_)));
        assert!(scheduler.is_running());
        assert_eq!(bulk.fetch_calls(), 1);
        assert_eq!(live.fetch_calls(), 1);
        assert_eq!(store.rows().len(), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_waits_for_seed_to_finish() {
        let store = Arc::new(InMemoryExploitStore::new());
        let bulk = Arc::new(
            FakeProvider::with_rows(vec![exploit_row("Multichain", "2023-07-06", 126_000_000.0)])
                .with_delay(Duration::from_secs(30)),
        );
        let live = Arc::new(FakeProvider::with_rows(Vec::new()));
        let (seeder, scheduler) = services(store.clone(), bulk, live.clone());
        let seeder = Arc::new(seeder);
        let scheduler = Arc::new(scheduler);

        let task = {
            let (seeder, scheduler) = (seeder.clone(), scheduler.clone());
            tokio::spawn(async move { start_services(&seeder, &scheduler).await })
        };

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!scheduler.is_running());
        assert_eq!(live.fetch_calls(), 0);

        let outcome = task.await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(matches!(outcome, SeedOutcome::Seeded(ref r) if r.inserted == 1));
        assert!(scheduler.is_running());
        assert_eq!(live.fetch_calls(), 1);
        scheduler.shutdown().await;
    }
}
