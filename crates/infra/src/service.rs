//! Explicitly constructed notification service.
//!
//! Built once at process start from [`Collaborators`] and shared by handle;
//! there is no module-level queue or worker state.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tracing::info;

use talentbridge_core::{CorrelationId, DomainError, JobId, UserId};
use talentbridge_events::InMemoryEventBus;
use talentbridge_notifications::audit::events;
use talentbridge_notifications::{
    AuditEntry, AuditStatus, Job, JobState, JobStatusView, NewNotification, NormalizedState, Notification,
    NotificationPayload, Preference, Priority, StateCounts, WorkerEvent,
};

use crate::audit::{AuditError, AuditRecorder, AuditSink, InMemoryAuditLog, PostgresAuditLog};
use crate::config::NotifyConfig;
use crate::delivery::{
    DeliveryCoordinator, EmailChannel, InAppChannel, LogMailTransport, MailTransport, SessionRegistry, SocketChannel,
};
use crate::jobs::{
    InMemoryJobStore, JobStore, PostgresJobStore, QueueError, RetryScheduler, WorkerPool, WorkerPoolConfig,
    WorkerPoolHandle,
};
use crate::pipeline::{NotificationProcessor, PermissionValidator, PreferenceResolver};
use crate::rate_limit::{Decision, InMemoryRateLimitStore, RateLimitError, RateLimitStore, RateLimiter, ThroughputGate};
use crate::repositories::{
    AccountDirectory, InMemoryAccountDirectory, InMemoryNotificationStore, InMemoryPreferenceStore, NotificationStore,
    PostgresAccountDirectory, PostgresNotificationStore, PostgresPreferenceStore, PreferenceStore, RepositoryError,
};
use crate::status::JobStatusReader;
use crate::workers::{LifecycleObserver, ObserverHandle};

/// Why a producer call was rejected. No job exists when this is returned.
#[derive(Debug, thiserror::Error)]
pub enum EnqueueError {
    #[error("invalid payload: {0}")]
    InvalidPayload(#[from] DomainError),

    #[error("Rate limit exceeded for sender {0}")]
    RateLimited(UserId),

    #[error("rate limiter unavailable: {0}")]
    RateLimiterUnavailable(#[from] RateLimitError),

    #[error("failed to persist notification: {0}")]
    Persistence(#[from] RepositoryError),

    #[error("failed to enqueue job: {0}")]
    Queue(#[from] QueueError),
}

/// Storage and transport seams the service is built from.
#[derive(Clone)]
pub struct Collaborators {
    pub jobs: Arc<dyn JobStore>,
    pub accounts: Arc<dyn AccountDirectory>,
    pub preferences: Arc<dyn PreferenceStore>,
    pub notifications: Arc<dyn NotificationStore>,
    pub audit: Arc<dyn AuditSink>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub mail: Arc<dyn MailTransport>,
}

impl Collaborators {
    /// Everything in process memory (dev/test).
    pub fn in_memory() -> Self {
        Self::in_memory_with_accounts(Arc::new(InMemoryAccountDirectory::new()))
    }

    pub fn in_memory_with_accounts(accounts: Arc<dyn AccountDirectory>) -> Self {
        Self {
            jobs: InMemoryJobStore::arc(),
            accounts,
            preferences: Arc::new(InMemoryPreferenceStore::new()),
            notifications: Arc::new(InMemoryNotificationStore::new()),
            audit: Arc::new(InMemoryAuditLog::new()),
            rate_limits: Arc::new(InMemoryRateLimitStore::new()),
            mail: Arc::new(LogMailTransport),
        }
    }

    /// Postgres stores, plus Redis counters when the `redis` feature is on.
    pub async fn connect(config: &NotifyConfig) -> anyhow::Result<Self> {
        let database_url = config
            .database_url
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required when USE_PERSISTENT_STORES=true"))?;
        let pool = crate::db::connect(database_url, (config.worker_concurrency as u32).saturating_add(5)).await?;

        Ok(Self {
            jobs: Arc::new(PostgresJobStore::new(pool.clone()).with_lease(config.job_lease)),
            accounts: Arc::new(PostgresAccountDirectory::new(pool.clone())),
            preferences: Arc::new(PostgresPreferenceStore::new(pool.clone())),
            notifications: Arc::new(PostgresNotificationStore::new(pool.clone())),
            audit: Arc::new(PostgresAuditLog::new(pool)),
            rate_limits: rate_limit_store(config).await?,
            mail: Arc::new(LogMailTransport),
        })
    }
}

#[cfg(feature = "redis")]
async fn rate_limit_store(config: &NotifyConfig) -> anyhow::Result<Arc<dyn RateLimitStore>> {
    let store = crate::rate_limit::RedisRateLimitStore::connect(&config.redis_url).await?;
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
async fn rate_limit_store(_config: &NotifyConfig) -> anyhow::Result<Arc<dyn RateLimitStore>> {
    tracing::warn!("redis feature not enabled, rate limit counters are process-local");
    Ok(Arc::new(InMemoryRateLimitStore::new()))
}

#[derive(Clone)]
pub struct NotificationService {
    config: NotifyConfig,
    collaborators: Collaborators,
    audit: AuditRecorder,
    limiter: RateLimiter,
    status: JobStatusReader,
    sessions: Arc<SessionRegistry>,
    events: Arc<InMemoryEventBus<WorkerEvent>>,
}

impl NotificationService {
    pub fn new(config: NotifyConfig, collaborators: Collaborators) -> Self {
        let audit = AuditRecorder::new(collaborators.audit.clone());
        let limiter = RateLimiter::new(
            collaborators.rate_limits.clone(),
            audit.clone(),
            config.rate_limit_max,
            config.rate_limit_window,
        );
        let status = JobStatusReader::new(collaborators.jobs.clone(), config.queue_name.clone());

        Self {
            config,
            collaborators,
            audit,
            limiter,
            status,
            sessions: Arc::new(SessionRegistry::new()),
            events: Arc::new(InMemoryEventBus::new()),
        }
    }

    pub fn in_memory(config: NotifyConfig) -> Self {
        let collaborators = Collaborators {
            jobs: Arc::new(InMemoryJobStore::new().with_lease(config.job_lease)),
            ..Collaborators::in_memory()
        };
        Self::new(config, collaborators)
    }

    /// Build from configuration, choosing persistent or in-memory stores.
    pub async fn from_config(config: NotifyConfig) -> anyhow::Result<Self> {
        if config.use_persistent_stores {
            let collaborators = Collaborators::connect(&config).await?;
            info!(queue = %config.queue_name, "notification service using persistent stores");
            Ok(Self::new(config, collaborators))
        } else {
            info!(queue = %config.queue_name, "notification service using in-memory stores");
            Ok(Self::in_memory(config))
        }
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.config
    }

    /// Live realtime sessions, for the socket channel and its transport.
    pub fn sessions(&self) -> Arc<SessionRegistry> {
        self.sessions.clone()
    }

    pub fn events(&self) -> Arc<InMemoryEventBus<WorkerEvent>> {
        self.events.clone()
    }

    /// Admit, persist and queue one notification. Returns once the job and
    /// its notification row are durable; delivery happens later.
    pub async fn enqueue(
        &self,
        payload: NotificationPayload,
        priority: Priority,
        delay: Duration,
        is_admin: bool,
    ) -> Result<JobId, EnqueueError> {
        let sender = payload.sender_id;
        if self.limiter.admit(sender, is_admin).await? == Decision::Deny {
            return Err(EnqueueError::RateLimited(sender));
        }

        let job = Job::new(payload, priority)
            .with_retry_policy(self.config.retry_policy())
            .delayed(delay);

        let notification = self
            .collaborators
            .notifications
            .upsert_for_job(NewNotification::from_payload(job.id, &job.payload))
            .await?;
        let job = job.with_notification(notification.id);
        let (run_at, user_id) = (job.run_at, job.payload.user_id);

        let job_id = self.collaborators.jobs.enqueue(job).await?;

        self.audit
            .record(
                AuditEntry::new(events::JOB_ENQUEUED, AuditStatus::Pending)
                    .job(job_id)
                    .retries(0)
                    .notification(Some(notification.id))
                    .user(sender),
            )
            .await;

        info!(
            job_id = %job_id,
            notification_id = %notification.id,
            sender_id = %sender,
            user_id = %user_id,
            priority = %priority,
            run_at = %run_at,
            "notification job enqueued"
        );
        Ok(job_id)
    }

    /// Producer entry point for untyped JSON; required fields are checked first.
    pub async fn enqueue_json(
        &self,
        payload: Value,
        priority: Priority,
        delay: Duration,
        is_admin: bool,
    ) -> Result<JobId, EnqueueError> {
        let payload = NotificationPayload::from_json(payload)?;
        self.enqueue(payload, priority, delay, is_admin).await
    }

    pub async fn get_status(&self, job_id: &str) -> Result<Option<JobStatusView>, QueueError> {
        self.status.get_status(job_id).await
    }

    pub async fn list_jobs(
        &self,
        state: Option<NormalizedState>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<JobStatusView>, QueueError> {
        self.status.list(state, offset, limit).await
    }

    pub async fn counts(&self) -> Result<StateCounts, QueueError> {
        self.status.counts().await
    }

    /// Full stored job, for operator inspection.
    pub async fn inspect(&self, job_id: JobId) -> Result<Option<Job>, QueueError> {
        self.collaborators.jobs.get(job_id).await
    }

    /// Requeue a permanently failed job with a fresh attempt budget.
    pub async fn retry_failed(&self, job_id: JobId) -> Result<JobStatusView, QueueError> {
        let mut job = self
            .collaborators
            .jobs
            .get(job_id)
            .await?
            .ok_or(QueueError::NotFound(job_id))?;

        if job.state != JobState::Failed {
            return Err(QueueError::InvalidState {
                job_id,
                state: job.state.as_str(),
                expected: JobState::Failed.as_str(),
            });
        }

        let now = Utc::now();
        let previous = job.failed_reason.clone();
        job.reset_for_retry(now);
        self.collaborators.jobs.save(&job).await?;

        let mut entry = AuditEntry::new(events::JOB_REQUEUED, AuditStatus::Pending)
            .job(job_id)
            .retries(0)
            .notification(job.notification_id)
            .user(job.payload.user_id);
        if let Some(previous) = previous {
            entry = entry.error(previous);
        }
        self.audit.record(entry).await;

        info!(job_id = %job_id, "failed job requeued by operator");
        Ok(JobStatusView::from_job(&job, self.status.queue_name(), now))
    }

    pub async fn upsert_preference(&self, preference: Preference) -> Result<(), RepositoryError> {
        self.collaborators.preferences.upsert(preference).await
    }

    pub async fn preferences(&self, user_id: UserId) -> Result<Vec<Preference>, RepositoryError> {
        self.collaborators.preferences.find_preferences(user_id).await
    }

    pub async fn notifications_for(&self, user_id: UserId, limit: usize) -> Result<Vec<Notification>, RepositoryError> {
        self.collaborators.notifications.list_for_user(user_id, limit).await
    }

    pub async fn audit_trail(&self, job_id: JobId) -> Result<Vec<AuditEntry>, AuditError> {
        self.audit.trail(job_id).await
    }

    pub async fn attempt_trail(&self, correlation_id: CorrelationId) -> Result<Vec<AuditEntry>, AuditError> {
        self.audit.attempt_trail(correlation_id).await
    }

    /// Worker pool wired to this service's stores. Not started.
    pub fn worker_pool(&self) -> WorkerPool {
        let c = &self.collaborators;

        let coordinator = DeliveryCoordinator::new(self.audit.clone())
            .with_channel(Arc::new(InAppChannel::new(c.notifications.clone())))
            .with_channel(Arc::new(EmailChannel::new(c.mail.clone())))
            .with_channel(Arc::new(SocketChannel::new(self.sessions.clone())));

        let processor = NotificationProcessor::new(
            PermissionValidator::new(c.accounts.clone()),
            PreferenceResolver::new(c.preferences.clone()),
            c.notifications.clone(),
            coordinator,
            c.jobs.clone(),
            self.audit.clone(),
        )
        .with_realtime_push(self.config.realtime_push);

        let scheduler = RetryScheduler::new(c.jobs.clone(), self.audit.clone(), self.config.retain_completed);
        let gate = ThroughputGate::new(
            c.rate_limits.clone(),
            &self.config.queue_name,
            self.config.throughput_max,
            self.config.throughput_window,
        );

        WorkerPool::new(c.jobs.clone(), processor, scheduler, self.events.clone()).with_throughput_gate(gate)
    }

    /// Start the configured number of workers on the current runtime.
    pub fn spawn_workers(&self) -> WorkerPoolHandle {
        let config = WorkerPoolConfig::default()
            .with_name(format!("{}-worker", self.config.queue_name))
            .with_concurrency(self.config.worker_concurrency)
            .with_poll_interval(self.config.poll_interval);
        self.worker_pool().spawn(config)
    }

    /// Start a thread that logs worker lifecycle events.
    pub fn spawn_observer(&self) -> io::Result<ObserverHandle> {
        LifecycleObserver::spawn_logging("notification-lifecycle", self.events.clone())
    }
}

impl core::fmt::Debug for NotificationService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("NotificationService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
