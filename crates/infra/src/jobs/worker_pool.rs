//! Bounded-concurrency worker pool.
//!
//! `concurrency` tokio tasks each loop: reserve throughput budget, claim the
//! next eligible job, process it, hand the outcome to the retry scheduler.
//! A worker never holds more than one job, so in-flight jobs are bounded by
//! the pool size regardless of queue depth.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use talentbridge_core::CorrelationId;
use talentbridge_events::{EventBus, InMemoryEventBus};
use talentbridge_notifications::WorkerEvent;

use super::scheduler::{RetryScheduler, Settlement};
use super::store::{JobStore, QueueError};
use crate::pipeline::NotificationProcessor;
use crate::rate_limit::ThroughputGate;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Concurrent workers (and therefore in-flight jobs).
    pub concurrency: usize,
    /// Idle sleep when nothing is eligible.
    pub poll_interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            poll_interval: Duration::from_millis(250),
            name: "notification-worker".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Pool runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct WorkerPoolStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_retried: u64,
    pub jobs_failed: u64,
    pub current_running: usize,
}

#[derive(Debug, Default)]
struct Counters {
    processed: AtomicU64,
    succeeded: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
    running: AtomicUsize,
}

impl Counters {
    fn snapshot(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            jobs_processed: self.processed.load(Ordering::Relaxed),
            jobs_succeeded: self.succeeded.load(Ordering::Relaxed),
            jobs_retried: self.retried.load(Ordering::Relaxed),
            jobs_failed: self.failed.load(Ordering::Relaxed),
            current_running: self.running.load(Ordering::Relaxed),
        }
    }
}

/// Drives claimed jobs through the notification pipeline.
#[derive(Clone)]
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    processor: NotificationProcessor,
    scheduler: RetryScheduler,
    throughput: Option<ThroughputGate>,
    events: Arc<InMemoryEventBus<WorkerEvent>>,
    counters: Arc<Counters>,
}

impl WorkerPool {
    pub fn new(
        store: Arc<dyn JobStore>,
        processor: NotificationProcessor,
        scheduler: RetryScheduler,
        events: Arc<InMemoryEventBus<WorkerEvent>>,
    ) -> Self {
        Self {
            store,
            processor,
            scheduler,
            throughput: None,
            events,
            counters: Arc::new(Counters::default()),
        }
    }

    /// Cap dequeues pool-wide.
    pub fn with_throughput_gate(mut self, gate: ThroughputGate) -> Self {
        self.throughput = Some(gate);
        self
    }

    pub fn stats(&self) -> WorkerPoolStats {
        self.counters.snapshot()
    }

    /// Claim and fully process at most one job.
    ///
    /// Returns `Ok(None)` when nothing is eligible or the throughput window is
    /// spent. Used by each worker loop and directly by tests.
    pub async fn process_next(&self) -> Result<Option<Settlement>, QueueError> {
        let reserved = match &self.throughput {
            None => false,
            Some(gate) => match gate.reserve().await {
                Ok(true) => true,
                Ok(false) => {
                    debug!("throughput window exhausted, deferring dequeue");
                    return Ok(None);
                }
                Err(err) => {
                    warn!(error = %err, "throughput gate unavailable, dequeuing anyway");
                    false
                }
            },
        };

        let job = match self.store.claim_next(Utc::now()).await {
            Ok(Some(job)) => job,
            Ok(None) => {
                self.release_reservation(reserved).await;
                return Ok(None);
            }
            Err(err) => {
                self.release_reservation(reserved).await;
                return Err(err);
            }
        };

        let correlation_id = CorrelationId::new();
        self.publish(WorkerEvent::Claimed {
            job_id: job.id,
            correlation_id,
            attempt: job.attempts,
        });

        self.counters.running.fetch_add(1, Ordering::Relaxed);
        let report = self.processor.process(&job, correlation_id).await;
        let (job_id, attempts) = (job.id, job.attempts);
        let settled = self.scheduler.settle(job, report.outcome, Utc::now()).await;
        self.counters.running.fetch_sub(1, Ordering::Relaxed);
        self.counters.processed.fetch_add(1, Ordering::Relaxed);

        let settlement = settled?;
        match &settlement {
            Settlement::Completed => {
                self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
                self.publish(WorkerEvent::Completed {
                    job_id,
                    correlation_id,
                    channels: report.delivered,
                });
            }
            Settlement::RetryScheduled { next_run_at, error } => {
                self.counters.retried.fetch_add(1, Ordering::Relaxed);
                self.publish(WorkerEvent::Retrying {
                    job_id,
                    attempt: attempts,
                    next_run_at: *next_run_at,
                    error: error.clone(),
                });
            }
            Settlement::Failed { reason } => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                self.publish(WorkerEvent::Failed {
                    job_id,
                    attempts,
                    reason: reason.clone(),
                });
            }
        }

        Ok(Some(settlement))
    }

    /// Start `config.concurrency` workers on the current tokio runtime.
    pub fn spawn(self, config: WorkerPoolConfig) -> WorkerPoolHandle {
        let cancel = CancellationToken::new();
        let mut tasks = JoinSet::new();

        info!(pool = %config.name, concurrency = config.concurrency, "worker pool starting");

        for index in 0..config.concurrency.max(1) {
            let pool = self.clone();
            let cancel = cancel.clone();
            let worker = format!("{}-{index}", config.name);
            let poll_interval = config.poll_interval;

            tasks.spawn(async move {
                debug!(worker = %worker, "worker started");
                loop {
                    if cancel.is_cancelled() {
                        break;
                    }

                    let idle = match pool.process_next().await {
                        Ok(Some(_)) => false,
                        Ok(None) => true,
                        Err(err) => {
                            error!(worker = %worker, error = %err, "worker iteration failed");
                            pool.publish(WorkerEvent::Error {
                                worker: worker.clone(),
                                message: err.to_string(),
                            });
                            true
                        }
                    };

                    if idle {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(poll_interval) => {}
                        }
                    }
                }
                debug!(worker = %worker, "worker stopped");
            });
        }

        WorkerPoolHandle {
            name: config.name,
            cancel,
            tasks,
            counters: self.counters.clone(),
        }
    }

    async fn release_reservation(&self, reserved: bool) {
        let Some(gate) = self.throughput.as_ref().filter(|_| reserved) else {
            return;
        };
        if let Err(err) = gate.release().await {
            warn!(error = %err, "failed to release throughput reservation");
        }
    }

    fn publish(&self, event: WorkerEvent) {
        if let Err(err) = self.events.publish(event) {
            warn!(error = ?err, "failed to publish worker event");
        }
    }
}

impl core::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("throughput", &self.throughput)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

/// Handle to a running pool.
#[derive(Debug)]
pub struct WorkerPoolHandle {
    name: String,
    cancel: CancellationToken,
    tasks: JoinSet<()>,
    counters: Arc<Counters>,
}

impl WorkerPoolHandle {
    pub fn stats(&self) -> WorkerPoolStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Stop claiming new jobs and wait for in-flight ones to settle.
    pub async fn shutdown(mut self) {
        info!(pool = %self.name, "worker pool stopping");
        self.cancel.cancel();
        while let Some(joined) = self.tasks.join_next().await {
            if let Err(err) = joined {
                error!(pool = %self.name, error = %err, "worker task panicked");
            }
        }
        info!(pool = %self.name, "worker pool stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talentbridge_core::UserId;
    use talentbridge_notifications::{Job, NotificationPayload, Priority, RetryPolicy};

    use crate::audit::{AuditRecorder, InMemoryAuditLog};
    use crate::delivery::{DeliveryCoordinator, InAppChannel};
    use crate::jobs::InMemoryJobStore;
    use crate::pipeline::{PermissionValidator, PreferenceResolver};
    use crate::rate_limit::InMemoryRateLimitStore;
    use crate::repositories::{Account, InMemoryAccountDirectory, InMemoryNotificationStore, InMemoryPreferenceStore};

    struct Fixture {
        pool: WorkerPool,
        store: Arc<InMemoryJobStore>,
        accounts: Arc<InMemoryAccountDirectory>,
        events: Arc<InMemoryEventBus<WorkerEvent>>,
    }

    fn fixture() -> Fixture {
        let store = InMemoryJobStore::arc();
        let accounts = Arc::new(InMemoryAccountDirectory::new());
        let notifications = Arc::new(InMemoryNotificationStore::new());
        let audit = AuditRecorder::new(Arc::new(InMemoryAuditLog::new()));
        let events = Arc::new(InMemoryEventBus::new());

        let processor = NotificationProcessor::new(
            PermissionValidator::new(accounts.clone()),
            PreferenceResolver::new(Arc::new(InMemoryPreferenceStore::new())),
            notifications.clone(),
            DeliveryCoordinator::new(audit.clone()).with_channel(Arc::new(InAppChannel::new(notifications))),
            store.clone(),
            audit.clone(),
        )
        .with_realtime_push(false);
        let scheduler = RetryScheduler::new(store.clone(), audit, false);

        Fixture {
            pool: WorkerPool::new(store.clone(), processor, scheduler, events.clone()),
            store,
            accounts,
            events,
        }
    }

    fn job_between(f: &Fixture, recipient_active: bool) -> Job {
        let (sender, recipient) = (UserId::new(), UserId::new());
        f.accounts.upsert(Account::active(sender));
        f.accounts.upsert(if recipient_active {
            Account::active(recipient)
        } else {
            Account::inactive(recipient)
        });
        Job::new(
            NotificationPayload::new(sender, recipient, "connect_request", "hello"),
            Priority::Normal,
        )
    }

    #[tokio::test]
    async fn empty_queue_is_idle() {
        let f = fixture();
        assert_eq!(f.pool.process_next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn successful_job_is_discarded_and_reported() {
        let f = fixture();
        let rx = f.events.subscribe();
        let job = job_between(&f, true);
        let id = f.store.enqueue(job).await.unwrap();

        assert_eq!(f.pool.process_next().await.unwrap(), Some(Settlement::Completed));
        assert!(f.store.get(id).await.unwrap().is_none());

        let claimed = rx.try_recv().unwrap();
        assert_eq!(claimed.name(), "claimed");
        match rx.try_recv().unwrap() {
            WorkerEvent::Completed { job_id, channels, .. } => {
                assert_eq!(job_id, id);
                assert_eq!(channels, 1);
            }
            other => panic!("unexpected event {other:?}"),
        }
        assert_eq!(f.pool.stats().jobs_succeeded, 1);
    }

    #[tokio::test]
    async fn denied_job_retries_then_fails_after_three_attempts() {
        let f = fixture();
        let job = job_between(&f, false).with_retry_policy(RetryPolicy::fixed(3, Duration::ZERO));
        let id = f.store.enqueue(job).await.unwrap();

        for _ in 0..2 {
            assert!(matches!(
                f.pool.process_next().await.unwrap(),
                Some(Settlement::RetryScheduled { .. })
            ));
        }
        assert!(matches!(f.pool.process_next().await.unwrap(), Some(Settlement::Failed { .. })));

        let failed = f.store.get(id).await.unwrap().unwrap();
        assert_eq!(failed.attempts, 3);
        assert!(failed.failed_reason.unwrap().contains("recipient inactive"));
        assert_eq!(f.pool.process_next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn throughput_gate_defers_claims() {
        let f = fixture();
        let gate = ThroughputGate::new(
            Arc::new(InMemoryRateLimitStore::new()),
            "notifications",
            1,
            Duration::from_secs(60),
        );
        let pool = f.pool.clone().with_throughput_gate(gate);

        let first = job_between(&f, true);
        let second = job_between(&f, true);
        f.store.enqueue(first).await.unwrap();
        f.store.enqueue(second).await.unwrap();

        assert_eq!(pool.process_next().await.unwrap(), Some(Settlement::Completed));
        assert_eq!(pool.process_next().await.unwrap(), None);
        assert_eq!(f.store.len(), 1);
    }

    /// Counter store that yields to the scheduler before every operation, so
    /// concurrent workers interleave between reading and writing the budget.
    struct YieldingCounters(InMemoryRateLimitStore);

    #[async_trait::async_trait]
    impl crate::rate_limit::RateLimitStore for YieldingCounters {
        async fn try_acquire(
            &self,
            key: &str,
            max: u32,
            window: Duration,
        ) -> Result<bool, crate::rate_limit::RateLimitError> {
            tokio::task::yield_now().await;
            self.0.try_acquire(key, max, window).await
        }

        async fn release(&self, key: &str) -> Result<(), crate::rate_limit::RateLimitError> {
            tokio::task::yield_now().await;
            self.0.release(key).await
        }
    }

    #[tokio::test]
    async fn concurrent_workers_never_exceed_throughput_cap() {
        let f = fixture();
        let gate = ThroughputGate::new(
            Arc::new(YieldingCounters(InMemoryRateLimitStore::new())),
            "notifications",
            2,
            Duration::from_secs(60),
        );
        let pool = f.pool.clone().with_throughput_gate(gate);
        for _ in 0..5 {
            let job = job_between(&f, true);
            f.store.enqueue(job).await.unwrap();
        }

        let results = futures::future::join_all((0..5).map(|_| pool.process_next())).await;
        let processed = results.into_iter().filter(|r| matches!(r, Ok(Some(_)))).count();

        assert_eq!(processed, 2);
        assert_eq!(f.store.len(), 3);
    }

    #[tokio::test]
    async fn empty_queue_does_not_spend_throughput_budget() {
        let f = fixture();
        let gate = ThroughputGate::new(
            Arc::new(InMemoryRateLimitStore::new()),
            "notifications",
            1,
            Duration::from_secs(60),
        );
        let pool = f.pool.clone().with_throughput_gate(gate);

        for _ in 0..3 {
            assert_eq!(pool.process_next().await.unwrap(), None);
        }

        let job = job_between(&f, true);
        f.store.enqueue(job).await.unwrap();
        assert_eq!(pool.process_next().await.unwrap(), Some(Settlement::Completed));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn spawned_pool_drains_queue_and_shuts_down() {
        let f = fixture();
        for _ in 0..4 {
            let job = job_between(&f, true);
            f.store.enqueue(job).await.unwrap();
        }

        let handle = f.pool.clone().spawn(
            WorkerPoolConfig::default()
                .with_concurrency(2)
                .with_poll_interval(Duration::from_millis(10)),
        );

        for _ in 0..200 {
            if handle.stats().jobs_succeeded == 4 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(handle.stats().jobs_succeeded, 4);
        assert!(f.store.is_empty());

        handle.shutdown().await;
    }
}
