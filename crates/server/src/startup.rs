//! Wiring for each subcommand: storage, pipeline, seeder, scheduler, probe.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

use hackwatch_core::{Config, ConfigError};
use hackwatch_ingest::{
    bulk_provider, live_provider, start_services, BatchProcessor, BootstrapSeeder,
    IngestPipeline, PollingScheduler, SeedOutcome,
};
use hackwatch_storage::{ExploitStore, PgExploitStore};

use crate::router::{self, AppState};

/// Connect to PostgreSQL and apply pending migrations.
async fn open_store(config: &Config) -> anyhow::Result<Arc<PgExploitStore>> {
    let store = PgExploitStore::connect(&config.postgres)
        .await
        .context("failed to connect to PostgreSQL")?;
    store.migrate().await.context("failed to apply migrations")?;
    Ok(Arc::new(store))
}

fn pipeline(store: Arc<dyn ExploitStore>, config: &Config) -> Arc<IngestPipeline> {
    Arc::new(IngestPipeline::new(BatchProcessor::new(
        store,
        config.ingest.batch_size,
    )))
}

pub async fn migrate(config: &Config) -> anyhow::Result<()> {
    open_store(config).await?;
    Ok(())
}

pub async fn seed(config: &Config, force: bool) -> anyhow::Result<()> {
    if config.dune.api_key.is_none() {
        return Err(ConfigError::Missing("DUNE_API_KEY".into()).into());
    }
    let store = open_store(config).await?;
    let seeder = BootstrapSeeder::new(pipeline(store, config), bulk_provider(config)?);

    let outcome = if force { seeder.force().await } else { seeder.run().await };
    match outcome {
        SeedOutcome::Skipped { existing } => {
            info!(existing, "Nothing to seed (use --force to load anyway)");
            Ok(())
        }
        SeedOutcome::Seeded(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        SeedOutcome::Failed(message) => anyhow::bail!("bootstrap seed failed: {message}"),
    }
}

pub async fn poll_once(config: &Config) -> anyhow::Result<()> {
    config.validate_services()?;
    let store = open_store(config).await?;
    let provider = live_provider(config)?;

    let report = pipeline(store, config)
        .run_cycle(provider.as_ref())
        .await
        .with_context(|| format!("{} ingestion cycle failed", provider.name()))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Long-running mode. Only configuration and database connection failures
/// end the process; ingestion failures are logged and retried.
pub async fn serve(config: &Config) -> anyhow::Result<()> {
    let services_enabled = config.services_enabled();
    if services_enabled {
        config.validate_services()?;
    }

    let store = open_store(config).await?;

    let (scheduler, services) = if services_enabled {
        let pipeline = pipeline(store, config);
        let seeder = BootstrapSeeder::new(pipeline.clone(), bulk_provider(config)?);
        let scheduler = Arc::new(PollingScheduler::new(
            pipeline,
            live_provider(config)?,
            Duration::from_secs(config.ingest.poll_interval_secs),
        ));

        // Runs in the background so health checks answer during a long
        // bulk load.
        let to_start = scheduler.clone();
        let services = tokio::spawn(async move {
            start_services(&seeder, &to_start).await;
        });
        (Some(scheduler), Some(services))
    } else {
        warn!("Background services disabled (set HACKWATCH_ENV=production or ENABLE_SERVICES=true)");
        (None, None)
    };

    let app = router::build(Arc::new(AppState {
        scheduler: scheduler.clone(),
    }));
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "Status probe listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down");
    if let Some(services) = services {
        // A seed interrupted here is safe to rerun; inserts are deduplicated.
        services.abort();
        let _ = services.await;
    }
    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    info!("Shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl_c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to register SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c.await;
}
