//! # Bulk-Sync Scheduler
//!
//! Background task that wakes on a fixed tick and starts a bulk sync once the
//! configured interval has elapsed since the previous run. Runs never overlap
//! each other or a manually triggered sync: all of them take the shared sync
//! lock first.

use std::sync::Arc;

use metrics::histogram;
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::bulk_sync::BulkSyncCoordinator;
use crate::complete_sync::SyncTrigger;
use crate::config::SchedulerConfig;

/// Process-wide lock serializing all sync work
pub type SyncLock = Arc<Mutex<()>>;

pub fn new_sync_lock() -> SyncLock {
    Arc::new(Mutex::new(()))
}

/// Background scheduler service.
pub struct BulkSyncScheduler {
    coordinator: BulkSyncCoordinator,
    config: SchedulerConfig,
    sync_lock: SyncLock,
}

/// Whether a bulk run is due, given when the previous one started
fn is_due(last_run: Option<Instant>, now: Instant, interval: Duration) -> bool {
    match last_run {
        None => true,
        Some(last) => now.saturating_duration_since(last) >= interval,
    }
}

impl BulkSyncScheduler {
    pub fn new(coordinator: BulkSyncCoordinator, config: SchedulerConfig, sync_lock: SyncLock) -> Self {
        Self {
            coordinator,
            config,
            sync_lock,
        }
    }

    /// Run the scheduler loop until the provided shutdown token fires.
    ///
    /// Shutdown also cancels an in-flight bulk run at its next account
    /// boundary.
    #[instrument(skip_all)]
    pub async fn run(self, shutdown: CancellationToken) {
        info!(
            interval_seconds = self.config.bulk_sync_interval_seconds,
            "Starting bulk sync scheduler"
        );
        let tick = Duration::from_secs(self.config.tick_seconds);
        let interval = Duration::from_secs(self.config.bulk_sync_interval_seconds);
        let mut last_run: Option<Instant> = None;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Bulk sync scheduler shutdown requested");
                    break;
                }
                _ = sleep(tick) => {
                    if !is_due(last_run, Instant::now(), interval) {
                        continue;
                    }
                    let Ok(_guard) = self.sync_lock.try_lock() else {
                        debug!("Sync already in progress; deferring scheduled bulk sync");
                        continue;
                    };

                    let started = Instant::now();
                    last_run = Some(started);
                    match self.coordinator.run(SyncTrigger::Scheduled, &shutdown).await {
                        Ok(outcome) => debug!(
                            run_id = %outcome.run_id,
                            status = outcome.status.as_str(),
                            "Scheduled bulk sync completed"
                        ),
                        Err(err) => error!(error = ?err, "Scheduled bulk sync failed"),
                    }
                    histogram!("bulk_sync_scheduler_run_duration_ms")
                        .record(started.elapsed().as_secs_f64() * 1_000.0);
                }
            }
        }

        info!("Bulk sync scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_is_always_due() {
        assert!(is_due(None, Instant::now(), Duration::from_secs(3600)));
    }

    #[test]
    fn due_only_after_interval() {
        let last = Instant::now();
        let interval = Duration::from_secs(300);
        assert!(!is_due(Some(last), last + Duration::from_secs(299), interval));
        assert!(is_due(Some(last), last + Duration::from_secs(300), interval));
    }

    #[tokio::test]
    async fn sync_lock_rejects_overlapping_runs() {
        let lock = new_sync_lock();
        let guard = lock.try_lock();
        assert!(guard.is_ok());
        assert!(lock.try_lock().is_err());
        drop(guard);
        assert!(lock.try_lock().is_ok());
    }
}
