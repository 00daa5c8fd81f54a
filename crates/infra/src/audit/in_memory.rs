use std::sync::RwLock;

use async_trait::async_trait;
use talentbridge_core::{CorrelationId, JobId};
use talentbridge_notifications::AuditEntry;

use super::{AuditError, AuditSink};

/// In-memory audit log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAuditLog {
    entries: RwLock<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry, in append order.
    pub fn all(&self) -> Vec<AuditEntry> {
        self.entries.read().map(|e| e.clone()).unwrap_or_default()
    }

    /// Entries with the given event name, in append order.
    pub fn with_event(&self, event: &str) -> Vec<AuditEntry> {
        self.filtered(|e| e.event == event).unwrap_or_default()
    }

    fn filtered<P>(&self, predicate: P) -> Result<Vec<AuditEntry>, AuditError>
    where
        P: Fn(&AuditEntry) -> bool,
    {
        let entries = self.entries.read().map_err(|_| AuditError::Poisoned)?;
        let mut matched: Vec<AuditEntry> = entries.iter().filter(|e| predicate(e)).cloned().collect();
        // Stable sort keeps append order for equal timestamps.
        matched.sort_by_key(|e| e.created_at);
        Ok(matched)
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        self.entries.write().map_err(|_| AuditError::Poisoned)?.push(entry);
        Ok(())
    }

    async fn by_job(&self, job_id: JobId) -> Result<Vec<AuditEntry>, AuditError> {
        self.filtered(|e| e.job_id == Some(job_id))
    }

    async fn by_correlation(&self, correlation_id: CorrelationId) -> Result<Vec<AuditEntry>, AuditError> {
        self.filtered(|e| e.correlation_id == Some(correlation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talentbridge_notifications::AuditStatus;
    use talentbridge_notifications::audit::events;

    #[tokio::test]
    async fn trail_is_scoped_to_job_and_ordered() {
        let log = InMemoryAuditLog::new();
        let job = JobId::new();
        let other = JobId::new();
        let cid = CorrelationId::new();

        log.append(AuditEntry::new(events::JOB_ENQUEUED, AuditStatus::Pending).job(job))
            .await
            .unwrap();
        log.append(AuditEntry::new(events::JOB_ENQUEUED, AuditStatus::Pending).job(other))
            .await
            .unwrap();
        log.append(
            AuditEntry::new(events::NOTIFICATION_SUCCESS, AuditStatus::Success)
                .job(job)
                .correlation(cid),
        )
        .await
        .unwrap();

        let trail = log.by_job(job).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].event, events::JOB_ENQUEUED);
        assert_eq!(trail[1].event, events::NOTIFICATION_SUCCESS);

        let attempt = log.by_correlation(cid).await.unwrap();
        assert_eq!(attempt.len(), 1);
        assert_eq!(log.with_event(events::JOB_ENQUEUED).len(), 2);
    }
}
