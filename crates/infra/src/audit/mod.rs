//! Append-only audit trail of job lifecycle events.
//!
//! Writes go through [`AuditRecorder`], which never fails: an audit sink that
//! is down must not take notification delivery with it.

mod in_memory;
mod postgres;

pub use in_memory::InMemoryAuditLog;
pub use postgres::PostgresAuditLog;

use std::sync::Arc;

use async_trait::async_trait;
use talentbridge_core::{CorrelationId, JobId};
use talentbridge_notifications::AuditEntry;
use tracing::warn;

/// Audit sink error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuditError {
    #[error("audit storage error: {0}")]
    Storage(String),
    #[error("audit log lock poisoned")]
    Poisoned,
}

/// Durable, append-only audit storage.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError>;

    /// Entries for one job, oldest first.
    async fn by_job(&self, job_id: JobId) -> Result<Vec<AuditEntry>, AuditError>;

    /// Entries for one processing attempt, oldest first.
    async fn by_correlation(&self, correlation_id: CorrelationId) -> Result<Vec<AuditEntry>, AuditError>;
}

/// Fire-and-forget front for an [`AuditSink`].
#[derive(Clone)]
pub struct AuditRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AuditRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Append an entry; failures are logged and swallowed.
    pub async fn record(&self, entry: AuditEntry) {
        let event = entry.event.clone();
        let job_id = entry.job_id;
        if let Err(err) = self.sink.append(entry).await {
            warn!(event = %event, job_id = ?job_id, error = %err, "audit write failed");
        }
    }

    pub async fn trail(&self, job_id: JobId) -> Result<Vec<AuditEntry>, AuditError> {
        self.sink.by_job(job_id).await
    }

    pub async fn attempt_trail(&self, correlation_id: CorrelationId) -> Result<Vec<AuditEntry>, AuditError> {
        self.sink.by_correlation(correlation_id).await
    }
}

impl core::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuditRecorder").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talentbridge_notifications::AuditStatus;
    use talentbridge_notifications::audit::events;

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn append(&self, _entry: AuditEntry) -> Result<(), AuditError> {
            Err(AuditError::Storage("connection refused".into()))
        }

        async fn by_job(&self, _job_id: JobId) -> Result<Vec<AuditEntry>, AuditError> {
            Err(AuditError::Storage("connection refused".into()))
        }

        async fn by_correlation(&self, _id: CorrelationId) -> Result<Vec<AuditEntry>, AuditError> {
            Err(AuditError::Storage("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn recorder_swallows_sink_failures() {
        let recorder = AuditRecorder::new(Arc::new(BrokenSink));
        recorder
            .record(AuditEntry::new(events::JOB_ENQUEUED, AuditStatus::Pending).job(JobId::new()))
            .await;

        assert!(recorder.trail(JobId::new()).await.is_err());
    }
}
