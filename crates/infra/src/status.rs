//! Read-only job status queries.

use std::sync::Arc;

use chrono::Utc;
use talentbridge_core::JobId;
use talentbridge_notifications::{JobStatusView, NormalizedState, StateCounts};

use crate::jobs::{JobStore, QueueError};

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 500;

#[derive(Clone)]
pub struct JobStatusReader {
    store: Arc<dyn JobStore>,
    queue_name: String,
}

impl JobStatusReader {
    pub fn new(store: Arc<dyn JobStore>, queue_name: impl Into<String>) -> Self {
        Self {
            store,
            queue_name: queue_name.into(),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    /// Status of one job, or `None` when the id is unknown or not a job id at all.
    pub async fn get_status(&self, job_id: &str) -> Result<Option<JobStatusView>, QueueError> {
        let Ok(id) = job_id.parse::<JobId>() else {
            return Ok(None);
        };
        self.status_of(id).await
    }

    pub async fn status_of(&self, job_id: JobId) -> Result<Option<JobStatusView>, QueueError> {
        let job = self.store.get(job_id).await?;
        Ok(job.map(|job| JobStatusView::from_job(&job, &self.queue_name, Utc::now())))
    }

    /// Page through jobs in enqueue order, optionally filtered by state.
    pub async fn list(
        &self,
        state: Option<NormalizedState>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<JobStatusView>, QueueError> {
        let now = Utc::now();
        let limit = limit.clamp(1, MAX_PAGE_SIZE);
        let jobs = self.store.list(state, offset, limit, now).await?;
        Ok(jobs
            .iter()
            .map(|job| JobStatusView::from_job(job, &self.queue_name, now))
            .collect())
    }

    pub async fn counts(&self) -> Result<StateCounts, QueueError> {
        self.store.counts(Utc::now()).await
    }
}

impl core::fmt::Debug for JobStatusReader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobStatusReader")
            .field("queue_name", &self.queue_name)
            .finish_non_exhaustive()
    }
}
