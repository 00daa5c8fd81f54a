//! Normalized job status projection for external status queries.

use core::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use talentbridge_core::{DomainError, JobId};

use crate::job::Job;
use crate::payload::NotificationPayload;
use crate::priority::Priority;

/// State reported to status callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizedState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

impl NormalizedState {
    pub const ALL: [NormalizedState; 5] = [
        Self::Waiting,
        Self::Active,
        Self::Completed,
        Self::Failed,
        Self::Delayed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Delayed => "delayed",
        }
    }

    /// Overlay terminal markers on the queue's raw label.
    ///
    /// A failure reason forces `failed`; otherwise a finish time means `completed`.
    pub fn normalize(
        raw: NormalizedState,
        finished_on: Option<DateTime<Utc>>,
        failed_reason: Option<&str>,
    ) -> NormalizedState {
        if failed_reason.is_some() {
            Self::Failed
        } else if finished_on.is_some() {
            Self::Completed
        } else {
            raw
        }
    }
}

impl core::fmt::Display for NormalizedState {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormalizedState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "state must be one of: waiting, active, completed, failed, delayed (got {s:?})"
                ))
            })
    }
}

/// Read-only view of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatusView {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
    pub status: NormalizedState,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_reason: Option<String>,
    pub queue_name: String,
    pub priority: Priority,
    pub attempts: u32,
    pub max_attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_retry: Option<DateTime<Utc>>,
    pub payload: NotificationPayload,
}

impl JobStatusView {
    pub fn from_job(job: &Job, queue_name: &str, now: DateTime<Utc>) -> Self {
        let status = NormalizedState::normalize(
            job.queue_state(now),
            job.finished_at,
            job.failed_reason.as_deref(),
        );

        Self {
            job_id: job.id,
            status,
            progress: job.progress,
            created_at: job.created_at,
            processed_at: job.processed_at,
            finished_at: job.finished_at,
            failed_reason: job.failed_reason.clone(),
            queue_name: queue_name.to_string(),
            priority: job.priority,
            attempts: job.attempts,
            max_attempts: job.max_attempts(),
            next_retry: job.next_retry(now),
            payload: job.payload.clone(),
        }
    }
}

/// Aggregate job counts per normalized state, for dashboards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    pub waiting: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub delayed: usize,
}

impl StateCounts {
    pub fn record(&mut self, state: NormalizedState) {
        match state {
            NormalizedState::Waiting => self.waiting += 1,
            NormalizedState::Active => self.active += 1,
            NormalizedState::Completed => self.completed += 1,
            NormalizedState::Failed => self.failed += 1,
            NormalizedState::Delayed => self.delayed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.waiting + self.active + self.completed + self.failed + self.delayed
    }
}
