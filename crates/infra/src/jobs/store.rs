//! Job storage implementations.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use talentbridge_core::JobId;
use talentbridge_notifications::{Job, JobState, NormalizedState, StateCounts};
use tracing::warn;

/// How long a claimed job may stay active before another claim takes it back.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(60);

/// Job store abstraction.
///
/// Implementations must make `claim_next` atomic: two workers never claim
/// the same job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Enqueue a new job.
    async fn enqueue(&self, job: Job) -> Result<JobId, QueueError>;

    /// Get a job by ID.
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, QueueError>;

    /// Claim the highest-priority eligible job (FIFO within a priority) and
    /// mark it active under a lease. Returns None if no jobs are eligible at `now`.
    ///
    /// Active jobs whose lease ran out before `now` are handed back first
    /// (see [`Job::expire_lease`]).
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError>;

    /// Record stage progress (0..=100) of an active job.
    async fn update_progress(&self, job_id: JobId, progress: u8) -> Result<(), QueueError>;

    /// Persist a job after a state transition.
    async fn save(&self, job: &Job) -> Result<(), QueueError>;

    /// Discard a job (completed jobs under the default retention policy).
    async fn remove(&self, job_id: JobId) -> Result<(), QueueError>;

    /// List jobs in enqueue order, optionally filtered by normalized state.
    async fn list(
        &self,
        state: Option<NormalizedState>,
        offset: usize,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, QueueError>;

    /// Count jobs per normalized state.
    async fn counts(&self, now: DateTime<Utc>) -> Result<StateCounts, QueueError>;
}

/// Job store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum QueueError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job already exists: {0}")]
    AlreadyExists(JobId),
    #[error("job {job_id} is {state}, expected {expected}")]
    InvalidState {
        job_id: JobId,
        state: &'static str,
        expected: &'static str,
    },
    #[error("storage error: {0}")]
    Storage(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("job store lock poisoned")]
    Poisoned,
}

/// Normalized state of a job as seen by status readers.
pub(crate) fn normalized_state(job: &Job, now: DateTime<Utc>) -> NormalizedState {
    NormalizedState::normalize(job.queue_state(now), job.finished_at, job.failed_reason.as_deref())
}

#[derive(Debug)]
struct Entry {
    job: Job,
    seq: u64,
}

type ReadyKey = (i16, u64, JobId);
type TimedKey = (DateTime<Utc>, u64, JobId);

#[derive(Debug, Default)]
struct QueueState {
    jobs: HashMap<JobId, Entry>,
    /// Eligible waiting jobs: priority rank, then enqueue order.
    ready: BTreeSet<ReadyKey>,
    /// Waiting jobs not yet promoted: by eligibility time.
    delayed: BTreeSet<TimedKey>,
    /// Active jobs: by lease deadline.
    leased: BTreeSet<TimedKey>,
    next_seq: u64,
}

impl QueueState {
    fn index(&mut self, job: &Job, seq: u64) {
        match (job.state, job.lease_expires_at) {
            (JobState::Waiting, _) => {
                self.delayed.insert((job.run_at, seq, job.id));
            }
            (JobState::Active, Some(deadline)) => {
                self.leased.insert((deadline, seq, job.id));
            }
            _ => {}
        }
    }

    fn unindex(&mut self, job: &Job, seq: u64) {
        self.ready.remove(&(job.priority.rank(), seq, job.id));
        self.delayed.remove(&(job.run_at, seq, job.id));
        if let Some(deadline) = job.lease_expires_at {
            self.leased.remove(&(deadline, seq, job.id));
        }
    }

    /// Hand every active job whose lease ran out back to the queue.
    fn reclaim(&mut self, now: DateTime<Utc>) {
        while let Some(&(deadline, seq, id)) = self.leased.first() {
            if deadline > now {
                break;
            }
            self.leased.pop_first();
            let Some(entry) = self.jobs.get_mut(&id) else {
                continue;
            };

            entry.job.expire_lease(now);
            warn!(job_id = %id, attempts = entry.job.attempts, state = entry.job.state.as_str(), "reclaimed job with expired lease");
            let job = entry.job.clone();
            self.index(&job, seq);
        }
    }

    /// Move every waiting job whose time has come into the ready set.
    fn promote(&mut self, now: DateTime<Utc>) {
        while let Some(&(run_at, seq, id)) = self.delayed.first() {
            if run_at > now {
                break;
            }
            self.delayed.pop_first();
            if let Some(entry) = self.jobs.get(&id) {
                self.ready.insert((entry.job.priority.rank(), seq, id));
            }
        }
    }
}

/// In-memory job store for tests/dev.
#[derive(Debug)]
pub struct InMemoryJobStore {
    state: RwLock<QueueState>,
    lease: Duration,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self {
            state: RwLock::default(),
            lease: DEFAULT_LEASE,
        }
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Number of jobs held (any state).
    pub fn len(&self) -> usize {
        self.state.read().map(|s| s.jobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        let mut state = self.state.write().map_err(|_| QueueError::Poisoned)?;
        if state.jobs.contains_key(&job.id) {
            return Err(QueueError::AlreadyExists(job.id));
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.index(&job, seq);

        let id = job.id;
        state.jobs.insert(id, Entry { job, seq });
        Ok(id)
    }

    async fn get(&self, job_id: JobId) -> Result<Option<Job>, QueueError> {
        let state = self.state.read().map_err(|_| QueueError::Poisoned)?;
        Ok(state.jobs.get(&job_id).map(|e| e.job.clone()))
    }

    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError> {
        let mut state = self.state.write().map_err(|_| QueueError::Poisoned)?;
        state.reclaim(now);
        state.promote(now);

        let Some((_, seq, id)) = state.ready.pop_first() else {
            return Ok(None);
        };
        let Some(entry) = state.jobs.get_mut(&id) else {
            return Ok(None);
        };

        entry.job.claim(now, self.lease);
        let job = entry.job.clone();
        state.index(&job, seq);
        Ok(Some(job))
    }

    async fn update_progress(&self, job_id: JobId, progress: u8) -> Result<(), QueueError> {
        let mut state = self.state.write().map_err(|_| QueueError::Poisoned)?;
        let entry = state.jobs.get_mut(&job_id).ok_or(QueueError::NotFound(job_id))?;
        entry.job.progress = progress.min(100);
        Ok(())
    }

    async fn save(&self, job: &Job) -> Result<(), QueueError> {
        let mut state = self.state.write().map_err(|_| QueueError::Poisoned)?;
        let Some(entry) = state.jobs.remove(&job.id) else {
            return Err(QueueError::NotFound(job.id));
        };

        let seq = entry.seq;
        state.unindex(&entry.job, seq);
        state.index(job, seq);
        state.jobs.insert(job.id, Entry { job: job.clone(), seq });
        Ok(())
    }

    async fn remove(&self, job_id: JobId) -> Result<(), QueueError> {
        let mut state = self.state.write().map_err(|_| QueueError::Poisoned)?;
        if let Some(entry) = state.jobs.remove(&job_id) {
            state.unindex(&entry.job, entry.seq);
        }
        Ok(())
    }

    async fn list(
        &self,
        filter: Option<NormalizedState>,
        offset: usize,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, QueueError> {
        let state = self.state.read().map_err(|_| QueueError::Poisoned)?;
        let mut entries: Vec<&Entry> = state
            .jobs
            .values()
            .filter(|e| filter.is_none_or(|s| normalized_state(&e.job, now) == s))
            .collect();

        entries.sort_by_key(|e| e.seq);
        Ok(entries
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|e| e.job.clone())
            .collect())
    }

    async fn counts(&self, now: DateTime<Utc>) -> Result<StateCounts, QueueError> {
        let state = self.state.read().map_err(|_| QueueError::Poisoned)?;
        let mut counts = StateCounts::default();
        for entry in state.jobs.values() {
            counts.record(normalized_state(&entry.job, now));
        }
        Ok(counts)
    }
}
