//! Turns a per-attempt [`JobOutcome`] into a queue transition.
//!
//! The worker only reports what happened; backoff timing, attempt
//! accounting and retention are decided here.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use talentbridge_notifications::audit::events;
use talentbridge_notifications::{AuditEntry, AuditStatus, Job, JobOutcome};

use super::store::{JobStore, QueueError};
use crate::audit::AuditRecorder;

/// What the scheduler did with a finished attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    Completed,
    RetryScheduled { next_run_at: DateTime<Utc>, error: String },
    Failed { reason: String },
}

#[derive(Clone)]
pub struct RetryScheduler {
    store: Arc<dyn JobStore>,
    audit: AuditRecorder,
    retain_completed: bool,
}

impl RetryScheduler {
    pub fn new(store: Arc<dyn JobStore>, audit: AuditRecorder, retain_completed: bool) -> Self {
        Self {
            store,
            audit,
            retain_completed,
        }
    }

    /// Apply `outcome` to a job claimed by a worker.
    pub async fn settle(&self, mut job: Job, outcome: JobOutcome, now: DateTime<Utc>) -> Result<Settlement, QueueError> {
        match outcome {
            JobOutcome::Success => {
                job.mark_completed(now);
                if self.retain_completed {
                    self.store.save(&job).await?;
                } else {
                    self.store.remove(job.id).await?;
                }
                Ok(Settlement::Completed)
            }
            JobOutcome::RetryableFailure(error) if job.has_attempts_left() => {
                let next_run_at = job.schedule_retry(error.clone(), now);
                self.store.save(&job).await?;

                info!(
                    job_id = %job.id,
                    attempt = job.attempts,
                    max_attempts = job.max_attempts(),
                    next_run_at = %next_run_at,
                    error = %error,
                    "job retry scheduled"
                );
                self.audit
                    .record(
                        AuditEntry::new(events::JOB_RETRY_SCHEDULED, AuditStatus::Retrying)
                            .job(job.id)
                            .retries(job.attempts)
                            .notification(job.notification_id)
                            .user(job.payload.user_id)
                            .error(error.clone()),
                    )
                    .await;

                Ok(Settlement::RetryScheduled { next_run_at, error })
            }
            JobOutcome::RetryableFailure(reason) | JobOutcome::PermanentFailure(reason) => {
                job.mark_failed(reason.clone(), now);
                self.store.save(&job).await?;

                warn!(job_id = %job.id, attempts = job.attempts, reason = %reason, "job failed permanently");
                self.audit
                    .record(
                        AuditEntry::new(events::JOB_FAILED, AuditStatus::Failed)
                            .job(job.id)
                            .retries(job.attempts)
                            .notification(job.notification_id)
                            .user(job.payload.user_id)
                            .error(reason.clone()),
                    )
                    .await;

                Ok(Settlement::Failed { reason })
            }
        }
    }
}

impl core::fmt::Debug for RetryScheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RetryScheduler")
            .field("retain_completed", &self.retain_completed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::InMemoryAuditLog;
    use crate::jobs::InMemoryJobStore;
    use talentbridge_core::UserId;
    use talentbridge_notifications::{JobState, NotificationPayload, Priority};

    async fn setup(retain: bool) -> (RetryScheduler, Arc<InMemoryJobStore>, Arc<InMemoryAuditLog>, Job) {
        let store = InMemoryJobStore::arc();
        let log = Arc::new(InMemoryAuditLog::new());
        let scheduler = RetryScheduler::new(store.clone(), AuditRecorder::new(log.clone()), retain);

        let payload = NotificationPayload::new(UserId::new(), UserId::new(), "connect_request", "hi");
        store.enqueue(Job::new(payload, Priority::Normal)).await.unwrap();
        let claimed = store.claim_next(Utc::now()).await.unwrap().unwrap();
        (scheduler, store, log, claimed)
    }

    #[tokio::test]
    async fn success_discards_by_default() {
        let (scheduler, store, _, job) = setup(false).await;
        let id = job.id;

        let settled = scheduler.settle(job, JobOutcome::Success, Utc::now()).await.unwrap();
        assert_eq!(settled, Settlement::Completed);
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn success_is_kept_when_retaining() {
        let (scheduler, store, _, job) = setup(true).await;
        let id = job.id;

        scheduler.settle(job, JobOutcome::Success, Utc::now()).await.unwrap();
        let kept = store.get(id).await.unwrap().unwrap();
        assert_eq!(kept.state, JobState::Completed);
        assert_eq!(kept.progress, 100);
    }

    #[tokio::test]
    async fn retryable_failure_backs_off_then_fails_on_last_attempt() {
        let (scheduler, store, log, job) = setup(false).await;
        let id = job.id;
        let now = Utc::now();

        let settled = scheduler
            .settle(job, JobOutcome::RetryableFailure("recipient inactive".into()), now)
            .await
            .unwrap();
        let Settlement::RetryScheduled { next_run_at, .. } = settled else {
            panic!("expected retry, got {settled:?}");
        };
        assert_eq!(next_run_at, now + chrono::Duration::seconds(1));

        let job = store.claim_next(next_run_at).await.unwrap().unwrap();
        let settled = scheduler
            .settle(job, JobOutcome::RetryableFailure("recipient inactive".into()), next_run_at)
            .await
            .unwrap();
        let Settlement::RetryScheduled { next_run_at: third, .. } = settled else {
            panic!("expected retry, got {settled:?}");
        };
        assert_eq!(third, next_run_at + chrono::Duration::seconds(2));

        let job = store.claim_next(third).await.unwrap().unwrap();
        assert_eq!(job.attempts, 3);
        let settled = scheduler
            .settle(job, JobOutcome::RetryableFailure("recipient inactive".into()), third)
            .await
            .unwrap();
        assert!(matches!(settled, Settlement::Failed { .. }));

        let failed = store.get(id).await.unwrap().unwrap();
        assert_eq!(failed.state, JobState::Failed);
        assert_eq!(failed.failed_reason.as_deref(), Some("recipient inactive"));
        assert_eq!(log.with_event(events::JOB_RETRY_SCHEDULED).len(), 2);
        assert_eq!(log.with_event(events::JOB_FAILED).len(), 1);
    }

    #[tokio::test]
    async fn permanent_failure_skips_retries() {
        let (scheduler, store, _, job) = setup(false).await;
        let id = job.id;

        let settled = scheduler
            .settle(job, JobOutcome::PermanentFailure("corrupt payload".into()), Utc::now())
            .await
            .unwrap();
        assert!(matches!(settled, Settlement::Failed { .. }));
        assert_eq!(store.get(id).await.unwrap().unwrap().attempts, 1);
    }
}
