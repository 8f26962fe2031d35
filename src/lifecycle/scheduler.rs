//! Delayed destruction scheduling.
//!
//! Owns the invariant "at most one pending cleanup job per service": jobs
//! are keyed by service id in a concurrent map, and scheduling a new job
//! unconditionally cancels whatever was pending for that id. The delayed
//! jobs themselves are plain tokio tasks; a periodic reaper sweep catches
//! anything lost to a process restart.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::task::JoinHandle;

use crate::lifecycle::executor;
use crate::metrics::Metrics;
use crate::store::postgres::PgStore;

/// Failed cleanups kept for operator inspection. Never retried.
const FAILURE_RETENTION: usize = 25;

struct PendingJob {
    epoch: i64,
    handle: JoinHandle<()>,
}

#[derive(Debug, Clone)]
pub struct CleanupFailure {
    pub service_id: i64,
    pub epoch: i64,
    pub error: String,
    pub at: DateTime<Utc>,
}

/// Cheap to clone; all clones share the pending-job table.
#[derive(Clone)]
pub struct CleanupScheduler {
    store: PgStore,
    metrics: Metrics,
    pending: Arc<DashMap<i64, PendingJob>>,
    failures: Arc<Mutex<VecDeque<CleanupFailure>>>,
}

/// Deterministic job identity, used for logging and diagnostics.
pub fn job_id(service_id: i64) -> String {
    format!("cleanup-{}", service_id)
}

impl CleanupScheduler {
    pub fn new(store: PgStore, metrics: Metrics) -> Self {
        Self {
            store,
            metrics,
            pending: Arc::new(DashMap::new()),
            failures: Arc::new(Mutex::new(VecDeque::new())),
        }
    }

    /// Schedule destruction of `service_id` after `delay`, replacing any
    /// job already pending for it. Callers must skip scheduling for
    /// already-elapsed expiries (the access gate rejects those services on
    /// its own); a zero delay here is treated the same way.
    pub fn schedule(&self, service_id: i64, epoch: i64, delay: Duration) {
        if delay.is_zero() {
            tracing::warn!(job = %job_id(service_id), "skipping schedule for elapsed expiry");
            return;
        }

        self.cancel(service_id);

        let scheduler = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            scheduler.execute(service_id, epoch).await;
        });

        self.pending.insert(service_id, PendingJob { epoch, handle });
        // A near-zero delay can fire before the insert above, in which
        // case the task found nothing to remove; drop the entry for it.
        self.pending
            .remove_if(&service_id, |_, job| {
                job.epoch == epoch && job.handle.is_finished()
            });
        tracing::debug!(job = %job_id(service_id), epoch, ?delay, "cleanup scheduled");
    }

    /// Remove and abort the pending job for `service_id`, if any.
    pub fn cancel(&self, service_id: i64) {
        if let Some((_, job)) = self.pending.remove(&service_id) {
            job.handle.abort();
            tracing::debug!(job = %job_id(service_id), epoch = job.epoch, "cleanup cancelled");
        }
    }

    pub fn has_pending(&self, service_id: i64) -> bool {
        self.pending.contains_key(&service_id)
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn failures(&self) -> Vec<CleanupFailure> {
        self.failures
            .lock()
            .expect("failure ring poisoned")
            .iter()
            .cloned()
            .collect()
    }

    /// Re-schedule jobs for every live service. Called once at startup so
    /// leases survive a restart; expired leftovers fall to the reaper.
    pub async fn rearm(&self) -> anyhow::Result<usize> {
        let now = Utc::now();
        let live = self.store.list_active_services(now).await?;
        let count = live.len();
        for service in live {
            let delay = (service.expires_at - now)
                .to_std()
                .unwrap_or(Duration::ZERO);
            self.schedule(service.id, service.cleanup_epoch, delay);
        }
        Ok(count)
    }

    /// Spawn the periodic reaper. Call this once at startup.
    pub fn spawn_reaper(&self, every: Duration) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = scheduler.sweep().await {
                    tracing::error!("reaper sweep failed: {}", e);
                }
            }
        });
    }

    /// Destroy every service whose expiry has passed but is still active:
    /// the in-memory job either fired and failed, or died with a previous
    /// process. Runs the same idempotent executor path.
    async fn sweep(&self) -> anyhow::Result<()> {
        let expired = self.store.list_expired_active(Utc::now()).await?;
        for service in expired {
            self.cancel(service.id);
            self.run(service.id, service.cleanup_epoch).await;
        }
        Ok(())
    }

    /// Entry point for fired delayed jobs.
    async fn execute(&self, service_id: i64, epoch: i64) {
        // Drop our pending entry first so a concurrent renewal can
        // schedule a fresh job while this one runs.
        self.pending
            .remove_if(&service_id, |_, job| job.epoch == epoch);
        self.run(service_id, epoch).await;
    }

    async fn run(&self, service_id: i64, epoch: i64) {
        match executor::run_cleanup(&self.store, service_id, epoch).await {
            Ok(outcome) if outcome.destroyed => {
                self.metrics.services_destroyed_total.inc();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(job = %job_id(service_id), "cleanup failed: {:#}", e);
                self.record_failure(service_id, epoch, &e);
            }
        }
    }

    fn record_failure(&self, service_id: i64, epoch: i64, error: &anyhow::Error) {
        let mut ring = self.failures.lock().expect("failure ring poisoned");
        ring.push_back(CleanupFailure {
            service_id,
            epoch,
            error: format!("{:#}", error),
            at: Utc::now(),
        });
        while ring.len() > FAILURE_RETENTION {
            ring.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::postgres::PgStore;

    fn test_scheduler() -> CleanupScheduler {
        // connect_lazy never touches the network until a job actually
        // fires, and these jobs are scheduled hours out.
        let store = PgStore::connect_lazy("postgres://localhost/mayfly_test").unwrap();
        CleanupScheduler::new(store, Metrics::new())
    }

    const FAR_OUT: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn test_reschedule_keeps_exactly_one_pending_job() {
        let scheduler = test_scheduler();
        for epoch in 0..5 {
            scheduler.schedule(7, epoch, FAR_OUT);
            assert_eq!(scheduler.pending_count(), 1);
        }
        assert!(scheduler.has_pending(7));
    }

    #[tokio::test]
    async fn test_cancel_removes_pending_job() {
        let scheduler = test_scheduler();
        scheduler.schedule(3, 0, FAR_OUT);
        assert!(scheduler.has_pending(3));
        scheduler.cancel(3);
        assert!(!scheduler.has_pending(3));
        // Cancelling a missing job is a no-op.
        scheduler.cancel(3);
        assert_eq!(scheduler.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_elapsed_delay_is_never_queued() {
        let scheduler = test_scheduler();
        scheduler.schedule(9, 0, Duration::ZERO);
        assert!(!scheduler.has_pending(9));
    }

    #[tokio::test]
    async fn test_jobs_for_distinct_services_coexist() {
        let scheduler = test_scheduler();
        scheduler.schedule(1, 0, FAR_OUT);
        scheduler.schedule(2, 0, FAR_OUT);
        assert_eq!(scheduler.pending_count(), 2);
    }

    #[tokio::test]
    async fn test_clones_share_the_pending_table() {
        let scheduler = test_scheduler();
        let other = scheduler.clone();
        scheduler.schedule(5, 0, FAR_OUT);
        assert!(other.has_pending(5));
        other.cancel(5);
        assert!(!scheduler.has_pending(5));
    }
}
