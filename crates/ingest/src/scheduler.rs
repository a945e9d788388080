//! Polling scheduler: runs ingestion cycles against the live provider on a
//! fixed interval until stopped.
//!
//! State machine is `Stopped → Running → Stopped`. `start` and `stop` are
//! idempotent. At most one cycle runs at a time: a tick that finds a cycle in
//! flight is skipped. A failed or panicking cycle is logged and the loop keeps
//! ticking. `stop` is cooperative, so an in-flight cycle finishes but no new one
//! begins.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::pipeline::{CycleReport, IngestPipeline};
use crate::provider::ExploitProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Snapshot served by the status probe.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub provider: String,
    pub interval_secs: u64,
    pub cycles_completed: u64,
    pub cycles_failed: u64,
    pub ticks_skipped: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_report: Option<CycleReport>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Stats {
    cycles_completed: u64,
    cycles_failed: u64,
    ticks_skipped: u64,
    last_run_at: Option<DateTime<Utc>>,
    last_report: Option<CycleReport>,
    last_error: Option<String>,
}

struct Shared {
    pipeline: Arc<IngestPipeline>,
    provider: Arc<dyn ExploitProvider>,
    interval: Duration,
    /// Held for the whole cycle; shared across restarts.
    cycle_guard: tokio::sync::Mutex<()>,
    stats: RwLock<Stats>,
}

enum LoopState {
    Stopped,
    Running {
        shutdown: Arc<Notify>,
        handle: JoinHandle<()>,
    },
}

pub struct PollingScheduler {
    shared: Arc<Shared>,
    state: Mutex<LoopState>,
    /// Loops told to stop that may still be finishing a cycle.
    draining: Mutex<Vec<JoinHandle<()>>>,
}

impl PollingScheduler {
    pub fn new(
        pipeline: Arc<IngestPipeline>,
        provider: Arc<dyn ExploitProvider>,
        interval: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                pipeline,
                provider,
                interval: interval.max(Duration::from_millis(1)),
                cycle_guard: tokio::sync::Mutex::new(()),
                stats: RwLock::new(Stats::default()),
            }),
            state: Mutex::new(LoopState::Stopped),
            draining: Mutex::new(Vec::new()),
        }
    }

    /// Start polling; the first cycle begins immediately.
    ///
    /// Returns `false` if already running. Must be called inside a tokio runtime.
    pub fn start(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(*state, LoopState::Running { .. }) {
            debug!("Polling scheduler already running");
            return false;
        }

        self.draining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|handle| !handle.is_finished());

        let shutdown = Arc::new(Notify::new());
        let handle = tokio::spawn(run_loop(self.shared.clone(), shutdown.clone()));
        *state = LoopState::Running { shutdown, handle };

        info!(
            provider = %self.shared.provider.name(),
            interval_secs = self.shared.interval.as_secs(),
            "Polling scheduler started"
        );
        true
    }

    /// Stop scheduling new cycles. Returns `false` if already stopped.
    pub fn stop(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match std::mem::replace(&mut *state, LoopState::Stopped) {
            LoopState::Stopped => false,
            LoopState::Running { shutdown, handle } => {
                // notify_one stores a permit, so a loop that is mid-cycle
                // still sees it at its next select.
                shutdown.notify_one();
                self.draining
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(handle);
                info!("Polling scheduler stopped");
                true
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(
            *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            LoopState::Running { .. }
        )
    }

    /// Stop and wait for every loop, including any in-flight cycle, to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let handles: Vec<_> = self
            .draining
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Polling loop terminated abnormally");
            }
        }
    }

    pub fn status(&self) -> SchedulerStatus {
        let state = if self.is_running() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        };
        let stats = self.shared.stats.read().unwrap_or_else(PoisonError::into_inner);
        SchedulerStatus {
            state,
            provider: self.shared.provider.name().to_string(),
            interval_secs: self.shared.interval.as_secs(),
            cycles_completed: stats.cycles_completed,
            cycles_failed: stats.cycles_failed,
            ticks_skipped: stats.ticks_skipped,
            last_run_at: stats.last_run_at,
            last_report: stats.last_report.clone(),
            last_error: stats.last_error.clone(),
        }
    }
}

async fn run_loop(shared: Arc<Shared>, shutdown: Arc<Notify>) {
    let mut ticker = tokio::time::interval(shared.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            _ = ticker.tick() => {}
        }

        let Ok(_guard) = shared.cycle_guard.try_lock() else {
            warn!("Previous ingestion cycle still running, skipping tick");
            shared.stats.write().unwrap_or_else(PoisonError::into_inner).ticks_skipped += 1;
            continue;
        };

        run_one(&shared).await;
    }

    debug!("Polling loop exited");
}

/// Run a cycle on its own task so a panic is contained and recorded.
async fn run_one(shared: &Arc<Shared>) {
    let started = Utc::now();
    let task_shared = shared.clone();
    let joined = tokio::spawn(async move {
        task_shared
            .pipeline
            .run_cycle(task_shared.provider.as_ref())
            .await
    })
    .await;

    let mut stats = shared.stats.write().unwrap_or_else(PoisonError::into_inner);
    stats.last_run_at = Some(started);
    match joined {
        Ok(Ok(report)) => {
            stats.cycles_completed += 1;
            stats.last_report = Some(report);
            stats.last_error = None;
        }
        Ok(Err(e)) => {
            error!(provider = %shared.provider.name(), error = %e, "Ingestion cycle failed");
            stats.cycles_failed += 1;
            stats.last_error = Some(e.to_string());
        }
        Err(e) => {
            error!(provider = %shared.provider.name(), error = %e, "Ingestion cycle panicked");
            stats.cycles_failed += 1;
            stats.last_error = Some(format!("cycle task failed: {e}"));
        }
    }
}
