//! Queued notification job and its lifecycle transitions.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use talentbridge_core::{JobId, NotificationId};

use crate::payload::NotificationPayload;
use crate::priority::Priority;
use crate::retry::RetryPolicy;
use crate::status::NormalizedState;

/// Stored state of a job.
///
/// `Waiting` covers both immediately eligible and delayed jobs; the two are
/// told apart by `run_at` (see [`Job::queue_state`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
}

impl JobState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Result of processing one attempt, as reported by the worker.
///
/// The retry scheduler, not the worker, turns this into a state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Success,
    /// May be retried while the attempt budget lasts.
    RetryableFailure(String),
    /// Never retried.
    PermanentFailure(String),
}

/// Record of a job execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobAttemptRecord {
    pub attempt: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub error: Option<String>,
    pub duration_ms: u64,
}

/// A queued notification job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub payload: NotificationPayload,
    pub priority: Priority,
    pub state: JobState,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far (incremented on claim).
    pub attempts: u32,
    /// 0..=100, reported by the worker per stage.
    pub progress: u8,
    /// Notification persisted at enqueue time.
    pub notification_id: Option<NotificationId>,
    pub created_at: DateTime<Utc>,
    /// Earliest time the job may be claimed.
    pub run_at: DateTime<Utc>,
    /// When the current (or last) attempt started.
    pub processed_at: Option<DateTime<Utc>>,
    /// Deadline of the current claim. An active job past it is handed back
    /// to the queue by the next claim.
    #[serde(default)]
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set only on terminal failure.
    pub failed_reason: Option<String>,
    /// Error of the most recent failed attempt.
    pub last_error: Option<String>,
    pub history: Vec<JobAttemptRecord>,
}

impl Job {
    /// Create a job that is eligible immediately.
    pub fn new(payload: NotificationPayload, priority: Priority) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            payload,
            priority,
            state: JobState::Waiting,
            retry_policy: RetryPolicy::default(),
            attempts: 0,
            progress: 0,
            notification_id: None,
            created_at: now,
            run_at: now,
            processed_at: None,
            lease_expires_at: None,
            finished_at: None,
            failed_reason: None,
            last_error: None,
            history: Vec::new(),
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Hold the job back for `delay` after creation.
    pub fn delayed(mut self, delay: Duration) -> Self {
        self.run_at = self.created_at + chrono::Duration::from_std(delay).unwrap_or_default();
        self
    }

    pub fn with_notification(mut self, notification_id: NotificationId) -> Self {
        self.notification_id = Some(notification_id);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.retry_policy.max_attempts
    }

    /// Whether another attempt remains after the current one.
    pub fn has_attempts_left(&self) -> bool {
        self.retry_policy.should_retry(self.attempts)
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Waiting && self.run_at <= now
    }

    /// Raw queue state label, before status normalization.
    pub fn queue_state(&self, now: DateTime<Utc>) -> NormalizedState {
        match self.state {
            JobState::Waiting if self.run_at > now => NormalizedState::Delayed,
            JobState::Waiting => NormalizedState::Waiting,
            JobState::Active => NormalizedState::Active,
            JobState::Completed => NormalizedState::Completed,
            JobState::Failed => NormalizedState::Failed,
        }
    }

    /// When the next retry becomes eligible, if one is scheduled.
    pub fn next_retry(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        (self.state == JobState::Waiting && self.attempts > 0 && self.run_at > now).then_some(self.run_at)
    }

    /// Claimed by a worker.
    pub fn mark_active(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Active;
        self.attempts += 1;
        self.progress = 0;
        self.processed_at = Some(now);
    }

    /// Claimed by a worker that must settle it before `now + lease`.
    pub fn claim(&mut self, now: DateTime<Utc>, lease: Duration) {
        self.mark_active(now);
        self.lease_expires_at = Some(now + chrono::Duration::from_std(lease).unwrap_or_default());
    }

    pub fn is_lease_expired(&self, now: DateTime<Utc>) -> bool {
        self.state == JobState::Active && self.lease_expires_at.is_some_and(|deadline| deadline <= now)
    }

    /// Take back a job whose worker never settled it. The abandoned attempt
    /// counts: the job waits again if attempts remain, otherwise it fails.
    pub fn expire_lease(&mut self, now: DateTime<Utc>) {
        let reason = format!("lease expired during attempt {}", self.attempts);
        if self.has_attempts_left() {
            self.record_attempt(now, false, Some(reason.clone()));
            self.state = JobState::Waiting;
            self.run_at = now;
            self.lease_expires_at = None;
            self.last_error = Some(reason);
        } else {
            self.mark_failed(reason, now);
        }
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.record_attempt(now, true, None);
        self.state = JobState::Completed;
        self.lease_expires_at = None;
        self.progress = 100;
        self.finished_at = Some(now);
        self.last_error = None;
    }

    /// Put the job back in the waiting set after backoff. Returns when it becomes eligible.
    pub fn schedule_retry(&mut self, error: String, now: DateTime<Utc>) -> DateTime<Utc> {
        self.record_attempt(now, false, Some(error.clone()));
        let delay = self.retry_policy.delay_for_attempt(self.attempts);
        self.run_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
        self.state = JobState::Waiting;
        self.lease_expires_at = None;
        self.last_error = Some(error);
        self.run_at
    }

    /// Terminal failure: retained for inspection.
    pub fn mark_failed(&mut self, reason: String, now: DateTime<Utc>) {
        self.record_attempt(now, false, Some(reason.clone()));
        self.state = JobState::Failed;
        self.lease_expires_at = None;
        self.finished_at = Some(now);
        self.last_error = Some(reason.clone());
        self.failed_reason = Some(reason);
    }

    /// Operator-initiated requeue of a failed job with a fresh attempt budget.
    pub fn reset_for_retry(&mut self, now: DateTime<Utc>) {
        self.state = JobState::Waiting;
        self.attempts = 0;
        self.progress = 0;
        self.run_at = now;
        self.lease_expires_at = None;
        self.finished_at = None;
        self.failed_reason = None;
    }

    fn record_attempt(&mut self, now: DateTime<Utc>, success: bool, error: Option<String>) {
        let started_at = self.processed_at.unwrap_or(now);
        self.history.push(JobAttemptRecord {
            attempt: self.attempts,
            started_at,
            finished_at: now,
            success,
            error,
            duration_ms: (now - started_at).num_milliseconds().max(0) as u64,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talentbridge_core::UserId;

    fn job() -> Job {
        let payload = NotificationPayload::new(UserId::new(), UserId::new(), "connect_request", "hi");
        Job::new(payload, Priority::Normal)
    }

    #[test]
    fn job_lifecycle() {
        let mut job = job();
        let now = Utc::now();

        assert_eq!(job.state, JobState::Waiting);
        assert!(job.is_ready(now));

        job.mark_active(now);
        assert_eq!(job.state, JobState::Active);
        assert_eq!(job.attempts, 1);

        job.mark_completed(now);
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.history.len(), 1);
        assert!(job.history[0].success);
    }

    #[test]
    fn delayed_job_is_not_ready_until_due() {
        let job = job().delayed(Duration::from_secs(30));
        let now = job.created_at;

        assert!(!job.is_ready(now));
        assert_eq!(job.queue_state(now), NormalizedState::Delayed);
        assert!(job.is_ready(now + chrono::Duration::seconds(30)));
    }

    #[test]
    fn retry_waits_for_exponential_backoff() {
        let mut job = job();
        let now = Utc::now();

        job.mark_active(now);
        let first = job.schedule_retry("smtp down".into(), now);
        assert_eq!(first, now + chrono::Duration::seconds(1));
        assert_eq!(job.next_retry(now), Some(first));

        job.mark_active(first);
        let second = job.schedule_retry("smtp down".into(), first);
        assert_eq!(second, first + chrono::Duration::seconds(2));
        assert_eq!(job.last_error.as_deref(), Some("smtp down"));
        assert!(job.failed_reason.is_none());
    }

    #[test]
    fn attempt_budget_is_exhausted_after_three_runs() {
        let mut job = job();
        let now = Utc::now();

        for _ in 0..2 {
            job.mark_active(now);
            assert!(job.has_attempts_left());
            job.schedule_retry("boom".into(), now);
        }
        job.mark_active(now);
        assert!(!job.has_attempts_left());

        job.mark_failed("boom".into(), now);
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 3);
        assert_eq!(job.history.len(), 3);
    }

    #[test]
    fn operator_reset_restores_budget() {
        let mut job = job();
        let now = Utc::now();
        job.mark_active(now);
        job.mark_failed("gone".into(), now);

        job.reset_for_retry(now);
        assert_eq!(job.state, JobState::Waiting);
        assert_eq!(job.attempts, 0);
        assert!(job.failed_reason.is_none());
        assert!(job.is_ready(now));
    }

    #[test]
    fn abandoned_claim_requeues_until_budget_runs_out() {
        let mut job = job();
        let now = Utc::now();
        let lease = Duration::from_secs(60);

        job.claim(now, lease);
        let deadline = now + chrono::Duration::seconds(60);
        assert_eq!(job.lease_expires_at, Some(deadline));
        assert!(!job.is_lease_expired(deadline - chrono::Duration::seconds(1)));
        assert!(job.is_lease_expired(deadline));

        job.expire_lease(deadline);
        assert!(job.is_ready(deadline));
        assert!(job.lease_expires_at.is_none());
        assert_eq!(job.history.len(), 1);
        assert!(!job.history[0].success);

        job.claim(deadline, lease);
        job.schedule_retry("smtp down".into(), deadline);
        assert!(job.lease_expires_at.is_none());

        job.claim(deadline, lease);
        assert_eq!(job.attempts, 3);
        job.expire_lease(deadline + chrono::Duration::seconds(60));
        assert_eq!(job.state, JobState::Failed);
        assert!(job.failed_reason.as_deref().unwrap().contains("lease expired"));
    }
}
