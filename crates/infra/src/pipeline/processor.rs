//! Per-job orchestration.
//!
//! `validating -> preferences -> persisting -> delivering -> done`. The
//! result is a [`JobOutcome`] for the retry scheduler, never a propagated error.

use std::sync::Arc;

use talentbridge_core::CorrelationId;
use talentbridge_notifications::audit::{events, stages};
use talentbridge_notifications::{AuditEntry, AuditStatus, Channel, Job, JobOutcome, NewNotification};
use tracing::{debug, error, info, warn};

use super::permission::{DenialReason, PermissionValidator};
use super::preferences::PreferenceResolver;
use crate::audit::AuditRecorder;
use crate::delivery::DeliveryCoordinator;
use crate::jobs::JobStore;
use crate::repositories::{NotificationStore, RepositoryError};

const PROGRESS_VALIDATING: u8 = 10;
const PROGRESS_PREFERENCES: u8 = 30;
const PROGRESS_PERSISTING: u8 = 50;
const PROGRESS_DELIVERING: u8 = 70;
const PROGRESS_DONE: u8 = 100;

#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error("permission denied: {0}")]
    PermissionDenied(DenialReason),

    #[error("failed to persist notification: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("delivery failed on channels: {}", join_channels(.0))]
    Delivery(Vec<Channel>),
}

impl ProcessingError {
    /// Every processing failure is retried while the attempt budget lasts;
    /// past it the scheduler marks the job failed.
    pub fn outcome(&self) -> JobOutcome {
        JobOutcome::RetryableFailure(self.to_string())
    }

    /// Failures already written to the audit log at the stage that raised them.
    fn is_audited(&self) -> bool {
        matches!(self, Self::PermissionDenied(_) | Self::Delivery(_))
    }
}

fn join_channels(channels: &[Channel]) -> String {
    channels.iter().map(|c| c.as_str()).collect::<Vec<_>>().join(", ")
}

/// What one attempt produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub outcome: JobOutcome,
    /// Channels that delivered successfully.
    pub delivered: usize,
}

#[derive(Clone)]
pub struct NotificationProcessor {
    validator: PermissionValidator,
    preferences: PreferenceResolver,
    notifications: Arc<dyn NotificationStore>,
    coordinator: DeliveryCoordinator,
    jobs: Arc<dyn JobStore>,
    audit: AuditRecorder,
    realtime_push: bool,
}

impl NotificationProcessor {
    pub fn new(
        validator: PermissionValidator,
        preferences: PreferenceResolver,
        notifications: Arc<dyn NotificationStore>,
        coordinator: DeliveryCoordinator,
        jobs: Arc<dyn JobStore>,
        audit: AuditRecorder,
    ) -> Self {
        Self {
            validator,
            preferences,
            notifications,
            coordinator,
            jobs,
            audit,
            realtime_push: true,
        }
    }

    /// Also push over `socket` whenever `in_app` is enabled.
    pub fn with_realtime_push(mut self, enabled: bool) -> Self {
        self.realtime_push = enabled;
        self
    }

    /// Process one claimed job under the attempt's correlation id.
    pub async fn process(&self, job: &Job, correlation_id: CorrelationId) -> ProcessReport {
        debug!(job_id = %job.id, correlation_id = %correlation_id, attempt = job.attempts, "processing job");

        match self.run(job, correlation_id).await {
            Ok(delivered) => ProcessReport {
                outcome: JobOutcome::Success,
                delivered,
            },
            Err(err) => {
                error!(
                    job_id = %job.id,
                    correlation_id = %correlation_id,
                    attempt = job.attempts,
                    error = %err,
                    "job processing failed"
                );
                if !err.is_audited() {
                    self.audit
                        .record(
                            AuditEntry::new(events::PROCESSING_FAILED, AuditStatus::Failed)
                                .job(job.id)
                                .correlation(correlation_id)
                                .retries(job.attempts)
                                .notification(job.notification_id)
                                .user(job.payload.user_id)
                                .stage(stages::PROCESSING)
                                .error(err.to_string()),
                        )
                        .await;
                }
                ProcessReport {
                    outcome: err.outcome(),
                    delivered: 0,
                }
            }
        }
    }

    /// Returns how many channels delivered.
    async fn run(&self, job: &Job, correlation_id: CorrelationId) -> Result<usize, ProcessingError> {
        let payload = &job.payload;

        self.progress(job, PROGRESS_VALIDATING).await;
        let check = self
            .validator
            .validate(payload.sender_id, payload.recipient(), &payload.kind)
            .await;
        if let Some(reason) = check.reason() {
            self.audit
                .record(
                    AuditEntry::new(events::PERMISSION_DENIED, AuditStatus::Failed)
                        .job(job.id)
                        .correlation(correlation_id)
                        .retries(job.attempts)
                        .notification(job.notification_id)
                        .user(payload.sender_id)
                        .stage(stages::VALIDATION)
                        .error(reason.to_string()),
                )
                .await;
            return Err(ProcessingError::PermissionDenied(reason.clone()));
        }

        self.progress(job, PROGRESS_PREFERENCES).await;
        let resolved = self.preferences.resolve(payload.user_id, &payload.kind).await;

        self.progress(job, PROGRESS_PERSISTING).await;
        let notification = self
            .notifications
            .upsert_for_job(NewNotification::from_payload(job.id, payload))
            .await?;

        let channels = self.effective_channels(resolved.enabled_channels);
        if channels.is_empty() {
            info!(job_id = %job.id, correlation_id = %correlation_id, kind = %payload.kind, "all channels disabled, nothing to deliver");
            self.audit
                .record(
                    AuditEntry::new(events::NOTIFICATION_SUCCESS, AuditStatus::Success)
                        .job(job.id)
                        .correlation(correlation_id)
                        .retries(job.attempts)
                        .notification(Some(notification.id))
                        .user(payload.user_id)
                        .stage(stages::NO_CHANNELS),
                )
                .await;
            self.progress(job, PROGRESS_DONE).await;
            return Ok(0);
        }

        self.progress(job, PROGRESS_DELIVERING).await;
        let results = self
            .coordinator
            .coordinate_delivery(job, &channels, Some(notification.id), correlation_id)
            .await;

        let failed: Vec<Channel> = results.iter().filter(|r| !r.success).map(|r| r.channel).collect();
        if results.iter().any(|r| r.is_retryable_failure()) {
            return Err(ProcessingError::Delivery(failed));
        }

        let base = if failed.is_empty() {
            AuditEntry::new(events::NOTIFICATION_SUCCESS, AuditStatus::Success)
        } else {
            warn!(job_id = %job.id, correlation_id = %correlation_id, channels = %join_channels(&failed), "delivery incomplete on final attempt");
            AuditEntry::new(events::NOTIFICATION_FAILED, AuditStatus::Failed)
                .error(format!("delivery failed on channels: {}", join_channels(&failed)))
        };
        self.audit
            .record(
                base.job(job.id)
                    .correlation(correlation_id)
                    .retries(job.attempts)
                    .notification(Some(notification.id))
                    .user(payload.user_id)
                    .stage(stages::ALL_CHANNELS),
            )
            .await;

        // Out of attempts with channels still undelivered: the job fails and is kept.
        if !failed.is_empty() {
            return Err(ProcessingError::Delivery(failed));
        }

        self.progress(job, PROGRESS_DONE).await;
        info!(
            job_id = %job.id,
            correlation_id = %correlation_id,
            notification_id = %notification.id,
            channels = %join_channels(&channels),
            "notification processed"
        );
        Ok(results.len())
    }

    fn effective_channels(&self, mut channels: Vec<Channel>) -> Vec<Channel> {
        if self.realtime_push && channels.contains(&Channel::InApp) && !channels.contains(&Channel::Socket) {
            channels.push(Channel::Socket);
        }
        channels
    }

    async fn progress(&self, job: &Job, progress: u8) {
        if let Err(err) = self.jobs.update_progress(job.id, progress).await {
            warn!(job_id = %job.id, progress, error = %err, "failed to record job progress");
        }
    }
}

impl core::fmt::Debug for NotificationProcessor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NotificationProcessor")
            .field("coordinator", &self.coordinator)
            .field("realtime_push", &self.realtime_push)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use talentbridge_core::UserId;
    use talentbridge_notifications::{NotificationPayload, Preference, Priority};

    use crate::audit::InMemoryAuditLog;
    use crate::delivery::{EmailChannel, InAppChannel, MailError, MailMessage, MailTransport};
    use crate::jobs::InMemoryJobStore;
    use crate::repositories::{
        Account, InMemoryAccountDirectory, InMemoryNotificationStore, InMemoryPreferenceStore, PreferenceStore,
    };

    struct Harness {
        processor: NotificationProcessor,
        accounts: Arc<InMemoryAccountDirectory>,
        preferences: Arc<InMemoryPreferenceStore>,
        notifications: Arc<InMemoryNotificationStore>,
        jobs: Arc<InMemoryJobStore>,
        log: Arc<InMemoryAuditLog>,
    }

    struct SmtpDown;

    #[async_trait::async_trait]
    impl MailTransport for SmtpDown {
        async fn send(&self, _message: &MailMessage) -> Result<(), MailError> {
            Err(MailError("connection refused".into()))
        }
    }

    fn harness(mail: Arc<dyn MailTransport>) -> Harness {
        let accounts = Arc::new(InMemoryAccountDirectory::new());
        let preferences = Arc::new(InMemoryPreferenceStore::new());
        let notifications = Arc::new(InMemoryNotificationStore::new());
        let jobs = InMemoryJobStore::arc();
        let log = Arc::new(InMemoryAuditLog::new());
        let audit = AuditRecorder::new(log.clone());

        let coordinator = DeliveryCoordinator::new(audit.clone())
            .with_channel(Arc::new(InAppChannel::new(notifications.clone())))
            .with_channel(Arc::new(EmailChannel::new(mail)));

        let processor = NotificationProcessor::new(
            PermissionValidator::new(accounts.clone()),
            PreferenceResolver::new(preferences.clone()),
            notifications.clone(),
            coordinator,
            jobs.clone(),
            audit,
        )
        .with_realtime_push(false);

        Harness {
            processor,
            accounts,
            preferences,
            notifications,
            jobs,
            log,
        }
    }

    /// Enqueue and claim a job between two fresh accounts.
    async fn claimed(h: &Harness, sender_active: bool, recipient_active: bool) -> Job {
        let (sender, recipient) = (UserId::new(), UserId::new());
        h.accounts.upsert(if sender_active { Account::active(sender) } else { Account::inactive(sender) });
        h.accounts
            .upsert(if recipient_active { Account::active(recipient) } else { Account::inactive(recipient) });

        let payload = NotificationPayload::new(sender, recipient, "connect_request", "wants to connect");
        h.jobs.enqueue(Job::new(payload, Priority::Normal)).await.unwrap();
        h.jobs.claim_next(Utc::now()).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn happy_path_delivers_in_app_and_reports_progress() {
        let h = harness(Arc::new(crate::delivery::LogMailTransport));
        let job = claimed(&h, true, true).await;

        assert_eq!(h.processor.process(&job, CorrelationId::new()).await.outcome, JobOutcome::Success);

        let notification = h.notifications.find_by_job(job.id).await.unwrap().unwrap();
        assert!(notification.delivered_at.is_some());
        assert_eq!(h.jobs.get(job.id).await.unwrap().unwrap().progress, 100);

        let success = h.log.with_event(events::NOTIFICATION_SUCCESS);
        assert_eq!(success.len(), 1);
        assert_eq!(success[0].notification_id, Some(notification.id));
        assert_eq!(success[0].stage.as_deref(), Some(stages::ALL_CHANNELS));
    }

    #[tokio::test]
    async fn inactive_recipient_is_retryable_and_audited_once() {
        let h = harness(Arc::new(crate::delivery::LogMailTransport));
        let job = claimed(&h, true, false).await;

        let outcome = h.processor.process(&job, CorrelationId::new()).await.outcome;
        assert!(matches!(outcome, JobOutcome::RetryableFailure(ref e) if e.contains("recipient inactive")));

        let denied = h.log.with_event(events::PERMISSION_DENIED);
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].status, AuditStatus::Failed);
        assert!(h.log.with_event(events::PROCESSING_FAILED).is_empty());
        assert!(h.notifications.is_empty());
    }

    #[tokio::test]
    async fn all_channels_disabled_succeeds_without_delivery() {
        let h = harness(Arc::new(crate::delivery::LogMailTransport));
        let job = claimed(&h, true, true).await;
        h.preferences
            .upsert(Preference {
                user_id: job.payload.user_id,
                kind: job.payload.kind.clone(),
                email: false,
                in_app: false,
                enabled: true,
            })
            .await
            .unwrap();

        assert_eq!(h.processor.process(&job, CorrelationId::new()).await.outcome, JobOutcome::Success);

        let notification = h.notifications.find_by_job(job.id).await.unwrap().unwrap();
        assert!(notification.delivered_at.is_none());
        let success = h.log.with_event(events::NOTIFICATION_SUCCESS);
        assert_eq!(success[0].stage.as_deref(), Some(stages::NO_CHANNELS));
    }

    #[tokio::test]
    async fn email_failure_retries_until_final_attempt() {
        let h = harness(Arc::new(SmtpDown));
        let mut job = claimed(&h, true, true).await;
        h.preferences
            .upsert(Preference {
                user_id: job.payload.user_id,
                kind: job.payload.kind.clone(),
                email: true,
                in_app: true,
                enabled: true,
            })
            .await
            .unwrap();

        let outcome = h.processor.process(&job, CorrelationId::new()).await.outcome;
        assert!(matches!(outcome, JobOutcome::RetryableFailure(ref e) if e.contains("email")));

        // Re-run as the final attempt: still a failure, but nothing is left to retry.
        job.attempts = job.max_attempts();
        let report = h.processor.process(&job, CorrelationId::new()).await;
        assert!(matches!(report.outcome, JobOutcome::RetryableFailure(ref e) if e.contains("email")));
        assert_eq!(report.delivered, 0);

        let final_entry = h
            .log
            .with_event(events::NOTIFICATION_FAILED)
            .into_iter()
            .find(|e| e.stage.as_deref() == Some(stages::ALL_CHANNELS))
            .unwrap();
        assert_eq!(final_entry.status, AuditStatus::Failed);
        assert!(final_entry.error_log.as_deref().unwrap().contains("email"));
        assert!(h.log.with_event(events::NOTIFICATION_SUCCESS).is_empty());
        assert_eq!(h.notifications.len(), 1);
    }

    #[tokio::test]
    async fn undelivered_channel_on_final_attempt_fails_and_keeps_job() {
        use crate::jobs::{RetryScheduler, Settlement};

        let h = harness(Arc::new(SmtpDown));
        let mut job = claimed(&h, true, true).await;
        h.preferences
            .upsert(Preference {
                user_id: job.payload.user_id,
                kind: job.payload.kind.clone(),
                email: true,
                in_app: true,
                enabled: true,
            })
            .await
            .unwrap();
        job.attempts = job.max_attempts();

        // Completed jobs are dropped under this scheduler; a failed one must not be.
        let scheduler = RetryScheduler::new(h.jobs.clone(), AuditRecorder::new(h.log.clone()), false);
        let outcome = h.processor.process(&job, CorrelationId::new()).await.outcome;
        let settlement = scheduler.settle(job.clone(), outcome, Utc::now()).await.unwrap();
        assert!(matches!(settlement, Settlement::Failed { ref reason } if reason.contains("email")));

        let stored = h.jobs.get(job.id).await.unwrap().unwrap();
        assert_eq!(stored.state, talentbridge_notifications::JobState::Failed);
        assert!(stored.failed_reason.as_deref().unwrap().contains("email"));
        assert_eq!(h.log.with_event(events::JOB_FAILED).len(), 1);
    }
}
