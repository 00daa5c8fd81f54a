//! Append-only audit trail entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use talentbridge_core::{CorrelationId, JobId, NotificationId, UserId};

/// Event names written to the audit log.
pub mod events {
    pub const JOB_ENQUEUED: &str = "job_enqueued";
    pub const RATE_LIMIT_BLOCK: &str = "rate_limit_block";
    pub const PERMISSION_DENIED: &str = "permission_denied";
    pub const CHANNEL_DELIVERED: &str = "channel_delivered";
    pub const NOTIFICATION_FAILED: &str = "notification_failed";
    pub const NOTIFICATION_SUCCESS: &str = "notification_success";
    pub const PROCESSING_FAILED: &str = "processing_failed";
    pub const JOB_RETRY_SCHEDULED: &str = "job_retry_scheduled";
    pub const JOB_FAILED: &str = "job_failed";
    pub const JOB_REQUEUED: &str = "job_requeued";
}

/// Stage labels recorded alongside events that are not tied to one channel.
pub mod stages {
    pub const ALL_CHANNELS: &str = "all_channels";
    pub const NO_CHANNELS: &str = "no_channels";
    pub const PROCESSING: &str = "processing";
    pub const VALIDATION: &str = "validation";
    pub const ADMISSION: &str = "admission";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Pending,
    Success,
    Failed,
    Retrying,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Retrying => "retrying",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            "retrying" => Some(Self::Retrying),
            _ => None,
        }
    }
}

/// One fact about one job-lifecycle event. Never updated or deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event: String,
    /// Absent for events that precede job creation (e.g. rate-limit blocks).
    pub job_id: Option<JobId>,
    pub correlation_id: Option<CorrelationId>,
    pub status: AuditStatus,
    /// Attempts made at the time of the event.
    pub retries: u32,
    pub error_log: Option<String>,
    pub notification_id: Option<NotificationId>,
    pub user_id: Option<UserId>,
    /// Channel tag or pipeline stage the event refers to.
    pub stage: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(event: impl Into<String>, status: AuditStatus) -> Self {
        Self {
            event: event.into(),
            job_id: None,
            correlation_id: None,
            status,
            retries: 0,
            error_log: None,
            notification_id: None,
            user_id: None,
            stage: None,
            created_at: Utc::now(),
        }
    }

    pub fn job(mut self, job_id: JobId) -> Self {
        self.job_id = Some(job_id);
        self
    }

    pub fn correlation(mut self, correlation_id: CorrelationId) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error_log = Some(error.into());
        self
    }

    pub fn notification(mut self, notification_id: Option<NotificationId>) -> Self {
        self.notification_id = notification_id;
        self
    }

    pub fn user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }
}
