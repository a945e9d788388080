//! End-to-end ingestion scenarios against the in-memory store.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::json;

use hackwatch_core::{NewExploit, RawProviderRow};
use hackwatch_ingest::{
    BatchProcessor, BootstrapSeeder, ExploitProvider, IngestPipeline, PollingScheduler,
    ProviderError, SeedOutcome,
};
use hackwatch_storage::InMemoryExploitStore;

struct ScriptedProvider {
    rows: Vec<RawProviderRow>,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn new(rows: Vec<RawProviderRow>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExploitProvider for ScriptedProvider {
    async fn fetch(&self) -> Result<Vec<RawProviderRow>, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Upstream("simulated network error".into()));
        }
        Ok(self.rows.clone())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn dune_rows() -> Vec<RawProviderRow> {
    [
        json!({
            "protocol": "Wormhole",
            "hack_date": "2022-02-02 00:00:00.000 UTC",
            "amount_stolen_usd": 326000000,
            "exploit_type": "Bridge",
            "technique": "Signature verification bypass",
            "related_entity": null,
            "recovered": "TRUE",
            "resolution": "Jump Crypto replaced funds",
            "audited_by": "Neodyme",
            "notes": null
        }),
        json!({
            "protocol": "Cashio",
            "hack_date": "not-a-date",
            "amount_stolen_usd": 52000000,
            "exploit_type": "Infinite mint",
            "technique": "Missing collateral validation",
            "recovered": false
        }),
        json!({
            "protocol": "Mango Markets",
            "hack_date": "2022-10-11 00:00:00.000 UTC",
            "amount_stolen_usd": 114000000,
            "exploit_type": "Oracle manipulation",
            "technique": "Price manipulation",
            "recovered": "false"
        }),
    ]
    .into_iter()
    .map(|v| serde_json::from_value(v).unwrap())
    .collect()
}

fn pipeline(store: Arc<InMemoryExploitStore>) -> Arc<IngestPipeline> {
    Arc::new(IngestPipeline::new(BatchProcessor::new(store, 1000)))
}

#[tokio::test]
async fn bulk_seed_rejects_bad_date_and_is_idempotent() {
    let store = Arc::new(InMemoryExploitStore::new());
    let pipeline = pipeline(store.clone());
    let provider = ScriptedProvider::new(dune_rows());

    let first = pipeline.run_cycle(provider.as_ref()).await.unwrap();
    assert_eq!(first.fetched, 3);
    assert_eq!(first.valid, 2);
    assert_eq!(first.rejected, 1);
    assert_eq!(first.inserted, 2);

    let second = pipeline.run_cycle(provider.as_ref()).await.unwrap();
    assert_eq!(second.valid, 2);
    assert_eq!(second.inserted, 0);

    let rows = store.rows();
    assert_eq!(rows.len(), 2);
    let wormhole = rows.iter().find(|r| r.protocol == "Wormhole").unwrap();
    assert!(wormhole.recovered);
    assert_eq!(wormhole.notes, None);
    let mango = rows.iter().find(|r| r.protocol == "Mango Markets").unwrap();
    assert!(!mango.recovered);
}

#[tokio::test]
async fn seeder_skips_when_store_already_has_ten_records() {
    let store = Arc::new(InMemoryExploitStore::new());
    let base = Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap();
    let existing: Vec<NewExploit> = (0..10)
        .map(|i| NewExploit {
            protocol: format!("Protocol {i}"),
            hack_date: base + ChronoDuration::days(i),
            amount_stolen: 1_000_000.0,
            exploit_type: "Rug pull".into(),
            technique: String::new(),
            related_entity: None,
            recovered: false,
            resolution: None,
            audited_by: None,
            notes: None,
        })
        .collect();
    store.preload(&existing);

    let bulk = ScriptedProvider::new(dune_rows());
    let seeder = BootstrapSeeder::new(pipeline(store.clone()), bulk.clone());

    assert!(matches!(seeder.run().await, SeedOutcome::Skipped { existing: 10 }));
    assert_eq!(bulk.calls(), 0);
    assert_eq!(store.create_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn seed_then_poll_with_failing_live_source() {
    let store = Arc::new(InMemoryExploitStore::new());
    let pipeline = pipeline(store.clone());

    let bulk = ScriptedProvider::new(dune_rows());
    let seeder = BootstrapSeeder::new(pipeline.clone(), bulk.clone());
    assert!(matches!(seeder.run().await, SeedOutcome::Seeded(ref r) if r.inserted == 2));

    let live = ScriptedProvider::new(dune_rows());
    live.fail.store(true, Ordering::SeqCst);
    let interval = Duration::from_secs(15);
    let scheduler = PollingScheduler::new(pipeline, live.clone(), interval);

    scheduler.start();
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(live.calls(), 1);
    assert_eq!(scheduler.status().cycles_failed, 1);

    // The next tick still fires on schedule after a failure.
    tokio::time::sleep(interval).await;
    assert_eq!(live.calls(), 2);
    assert_eq!(store.rows().len(), 2);

    live.fail.store(false, Ordering::SeqCst);
    tokio::time::sleep(interval).await;
    let status = scheduler.status();
    assert_eq!(status.cycles_completed, 1);
    assert_eq!(status.last_report.unwrap().inserted, 0);

    scheduler.shutdown().await;
    tokio::time::sleep(interval * 2).await;
    assert_eq!(live.calls(), 3);
}
