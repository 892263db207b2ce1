//! Periodic sync runs.
//!
//! `SyncJob` performs one guarded run; `SyncScheduler` owns the timer task
//! that triggers it.

use crate::device::DeviceGuard;
use std::sync::Arc;
use std::time::Duration;
use todoist_sync_core::fs::FileSystem;
use todoist_sync_core::project::ProjectSource;
use todoist_sync_core::reconcile::{ReconcileError, ReconcileReport, Reconciler};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// What happened when a run was requested.
#[derive(Debug)]
pub enum RunOutcome {
    Completed(ReconcileReport),
    /// Another device is configured as the primary sync device
    NotPrimaryDevice,
    /// The previous run is still in progress
    AlreadyRunning,
}

/// One reconciliation run against a vault, serialized so runs never overlap.
pub struct SyncJob<F: FileSystem, S: ProjectSource> {
    reconciler: Reconciler<F>,
    source: S,
    device: DeviceGuard,
    in_progress: Mutex<()>,
}

impl<F: FileSystem, S: ProjectSource> SyncJob<F, S> {
    pub fn new(reconciler: Reconciler<F>, source: S, device: DeviceGuard) -> Self {
        Self {
            reconciler,
            source,
            device,
            in_progress: Mutex::new(()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub async fn run_once(&self) -> Result<RunOutcome, ReconcileError> {
        if !self.device.allows() {
            info!(
                "Skipping sync: not primary sync device ({} != {})",
                self.device.current(),
                self.device.primary()
            );
            return Ok(RunOutcome::NotPrimaryDevice);
        }

        let Ok(_running) = self.in_progress.try_lock() else {
            debug!("Skipping sync: previous run still in progress");
            return Ok(RunOutcome::AlreadyRunning);
        };

        let report = self.reconciler.sync(&self.source).await?;
        if report.has_changes() || !report.is_clean() {
            info!("Sync finished: {}", report);
        } else {
            debug!("Sync finished: no changes");
        }
        Ok(RunOutcome::Completed(report))
    }
}

/// Runs a `SyncJob` on a fixed interval in a background task.
pub struct SyncScheduler<F: FileSystem + 'static, S: ProjectSource + 'static> {
    job: Arc<SyncJob<F, S>>,
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl<F: FileSystem + 'static, S: ProjectSource + 'static> SyncScheduler<F, S> {
    pub fn new(job: Arc<SyncJob<F, S>>, interval: Duration) -> Self {
        Self {
            job,
            interval: interval.max(Duration::from_secs(1)),
            task: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start ticking. The first run happens immediately. No-op if already started.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        let job = Arc::clone(&self.job);
        let period = self.interval;
        info!("Starting sync every {:?}", period);

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match job.run_once().await {
                    Ok(_) => {}
                    Err(ReconcileError::Remote(e)) => {
                        error!("Sync aborted, will retry next tick: {}", e);
                    }
                    Err(e) => error!("Sync failed: {}", e),
                }
            }
        }));
    }

    /// Stop ticking. Safe to call more than once.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("Sync stopped");
        }
    }

    /// Change the interval, restarting the timer if it was running.
    pub fn reconfigure(&mut self, interval: Duration) {
        let interval = interval.max(Duration::from_secs(1));
        if interval == self.interval {
            return;
        }
        self.interval = interval;
        if self.is_running() {
            self.stop();
            self.start();
        }
    }

    /// Run immediately, outside the timer. Skipped if a run is in progress.
    pub async fn trigger_now(&self) -> Result<RunOutcome, ReconcileError> {
        self.job.run_once().await
    }
}

impl<F: FileSystem + 'static, S: ProjectSource + 'static> Drop for SyncScheduler<F, S> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
