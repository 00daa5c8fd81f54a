//! Worker lifecycle events, published for observers only.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use talentbridge_core::{CorrelationId, JobId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WorkerEvent {
    Claimed {
        job_id: JobId,
        correlation_id: CorrelationId,
        attempt: u32,
    },
    Completed {
        job_id: JobId,
        correlation_id: CorrelationId,
        channels: usize,
    },
    Retrying {
        job_id: JobId,
        attempt: u32,
        next_run_at: DateTime<Utc>,
        error: String,
    },
    Failed {
        job_id: JobId,
        attempts: u32,
        reason: String,
    },
    /// Worker-level error not attributable to one job (e.g. store unavailable).
    Error { worker: String, message: String },
}

impl WorkerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Claimed { .. } => "claimed",
            Self::Completed { .. } => "completed",
            Self::Retrying { .. } => "retrying",
            Self::Failed { .. } => "failed",
            Self::Error { .. } => "error",
        }
    }

    pub fn job_id(&self) -> Option<JobId> {
        match self {
            Self::Claimed { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Retrying { job_id, .. }
            | Self::Failed { job_id, .. } => Some(*job_id),
            Self::Error { .. } => None,
        }
    }
}
