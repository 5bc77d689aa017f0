//! Stale-job janitor.
//!
//! A worker crash between the claim and the terminating transaction leaves
//! a job committed as RUNNING with no holder; a crash between submission
//! and the queue push leaves it SUBMITTED but never delivered. The janitor
//! periodically re-locks such rows and puts them back on the dispatch
//! queue, charging RUNNING recoveries one attempt.

use crate::error::JobResult;
use crate::executor::SweepNotifier;
use crate::metrics::names;
use crate::queue::DispatchQueue;
use crate::retry::RetryPolicy;
use chrono::Utc;
use metrics::counter;
use quantra_config::JanitorSettings;
use quantra_core::{JobId, JobState};
use quantra_store::JobStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Runtime configuration for the janitor.
#[derive(Debug, Clone)]
pub struct JanitorConfig {
    /// Sweep interval.
    pub interval: Duration,
    /// Age after which a RUNNING or SUBMITTED job counts as stale.
    pub stale_after: Duration,
}

impl Default for JanitorConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            stale_after: Duration::from_secs(600),
        }
    }
}

impl From<&JanitorSettings> for JanitorConfig {
    fn from(settings: &JanitorSettings) -> Self {
        Self {
            interval: Duration::from_secs(settings.interval_secs),
            stale_after: Duration::from_secs(settings.stale_after_secs),
        }
    }
}

/// Periodic recovery task for stale jobs.
pub struct Janitor {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn DispatchQueue>,
    retry: RetryPolicy,
    notifier: Arc<dyn SweepNotifier>,
    config: JanitorConfig,
}

impl Janitor {
    /// Creates a new janitor.
    #[must_use]
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn DispatchQueue>,
        retry: RetryPolicy,
        notifier: Arc<dyn SweepNotifier>,
        config: JanitorConfig,
    ) -> Self {
        Self {
            store,
            queue,
            retry,
            notifier,
            config,
        }
    }

    /// Runs until a shutdown signal arrives.
    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            stale_after_secs = self.config.stale_after.as_secs(),
            "Janitor started"
        );
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                () = tokio::time::sleep(self.config.interval) => {}
            }
            if let Err(e) = self.sweep_once().await {
                error!(error = %e, "Janitor sweep failed");
            }
        }
        info!("Janitor stopped");
    }

    /// One recovery pass; returns the number of jobs recovered.
    pub async fn sweep_once(&self) -> JobResult<u64> {
        let stale = self.store.find_stale_jobs(self.config.stale_after).await?;
        let mut recovered = 0u64;

        for job in stale {
            match self.recover(job.id).await {
                Ok(true) => recovered += 1,
                Ok(false) => {}
                Err(e) => warn!(job_id = %job.id, error = %e, "Failed to recover stale job"),
            }
        }

        if recovered > 0 {
            counter!(names::JOBS_RECOVERED_TOTAL).increment(recovered);
            info!(count = recovered, "Recovered stale jobs");
        }
        Ok(recovered)
    }

    async fn recover(&self, job_id: JobId) -> JobResult<bool> {
        let mut tx = self.store.begin().await?;

        let Some(mut job) = tx.lock_for_update(job_id).await? else {
            tx.rollback().await?;
            return Ok(false);
        };

        // Re-check staleness under the lock; the holder may have finished
        // between the scan and now.
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.stale_after).unwrap_or_default();
        if job.updated_at >= cutoff {
            tx.rollback().await?;
            return Ok(false);
        }

        match job.state {
            JobState::Running => {
                job.set_failure_reason("worker lost while RUNNING; requeued by janitor");
                job.record_failed_attempt();

                if !self.retry.is_exhausted(job.attempts) {
                    job.transition(JobState::Queued);
                    tx.save(&mut job).await?;
                    self.queue.push(job.id).await?;
                    tx.commit().await?;
                    warn!(job_id = %job.id, attempts = job.attempts, "Requeued stale RUNNING job");
                } else {
                    job.transition(JobState::Failed);
                    tx.save(&mut job).await?;
                    tx.commit().await?;
                    warn!(job_id = %job.id, "Stale RUNNING job exhausted its attempts; marked FAILED");
                    if let Some(sweep_id) = job.sweep_id {
                        if let Err(e) = self.notifier.on_child_terminal(sweep_id).await {
                            error!(sweep_id = %sweep_id, error = %e, "Sweep notification failed");
                        }
                    }
                }
                Ok(true)
            }
            JobState::Submitted => {
                // Never made it onto the queue; re-deliver without charging
                // an attempt.
                job.transition(JobState::Queued);
                tx.save(&mut job).await?;
                self.queue.push(job.id).await?;
                tx.commit().await?;
                warn!(job_id = %job.id, "Requeued orphaned SUBMITTED job");
                Ok(true)
            }
            _ => {
                debug!(job_id = %job.id, state = %job.state, "Job no longer stale-recoverable");
                tx.rollback().await?;
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        seed_job, InMemoryDispatchQueue, InMemoryJobStore, RecordingNotifier,
    };
    use chrono::NaiveDate;
    use quantra_core::{JobSpec, SweepId};

    fn spec() -> JobSpec {
        JobSpec {
            strategy: "BuyAndHold".to_string(),
            symbol: "AAPL".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 3, 31).unwrap(),
            parameters: serde_json::json!({}),
            initial_capital: 10_000.0,
        }
    }

    struct Harness {
        store: Arc<InMemoryJobStore>,
        queue: Arc<InMemoryDispatchQueue>,
        notifier: Arc<RecordingNotifier>,
        janitor: Janitor,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryJobStore::new());
        let queue = Arc::new(InMemoryDispatchQueue::new());
        let notifier = Arc::new(RecordingNotifier::new());
        let janitor = Janitor::new(
            store.clone(),
            queue.clone(),
            RetryPolicy::default(),
            notifier.clone(),
            JanitorConfig {
                interval: Duration::from_secs(60),
                stale_after: Duration::from_secs(600),
            },
        );
        Harness {
            store,
            queue,
            notifier,
            janitor,
        }
    }

    fn long_ago() -> chrono::DateTime<Utc> {
        Utc::now() - chrono::Duration::hours(1)
    }

    #[tokio::test]
    async fn test_requeues_stale_running_job_and_charges_an_attempt() {
        let h = harness();
        let id = h.store.insert(seed_job(spec(), JobState::Running, None));
        h.store.set_updated_at(id, long_ago());

        let recovered = h.janitor.sweep_once().await.unwrap();

        assert_eq!(recovered, 1);
        let job = h.store.get(id);
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempts, 1);
        assert!(job.failure_reason.as_ref().unwrap().contains("worker lost"));
        assert_eq!(h.queue.drain(), vec![id]);
    }

    #[tokio::test]
    async fn test_exhausted_stale_running_job_fails_and_notifies() {
        let h = harness();
        let sweep_id = SweepId::new(4);
        let mut job = seed_job(spec(), JobState::Running, Some(sweep_id));
        job.attempts = 2;
        let id = h.store.insert(job);
        h.store.set_updated_at(id, long_ago());

        h.janitor.sweep_once().await.unwrap();

        let job = h.store.get(id);
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 3);
        assert!(h.queue.drain().is_empty());
        assert_eq!(h.notifier.calls(), vec![sweep_id]);
    }

    #[tokio::test]
    async fn test_requeues_orphaned_submitted_job_without_charging() {
        let h = harness();
        let id = h.store.insert(seed_job(spec(), JobState::Submitted, None));
        h.store.set_updated_at(id, long_ago());

        h.janitor.sweep_once().await.unwrap();

        let job = h.store.get(id);
        assert_eq!(job.state, JobState::Queued);
        assert_eq!(job.attempts, 0);
        assert_eq!(h.queue.drain(), vec![id]);
    }

    #[tokio::test]
    async fn test_fresh_jobs_are_left_alone() {
        let h = harness();
        let id = h.store.insert(seed_job(spec(), JobState::Running, None));

        let recovered = h.janitor.sweep_once().await.unwrap();

        assert_eq!(recovered, 0);
        assert_eq!(h.store.get(id).state, JobState::Running);
        assert!(h.queue.drain().is_empty());
    }
}
