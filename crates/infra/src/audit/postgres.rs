//! Postgres-backed audit log (`notification_audit_log` table).

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use talentbridge_core::{CorrelationId, JobId, NotificationId, UserId};
use talentbridge_notifications::{AuditEntry, AuditStatus};

use super::{AuditError, AuditSink};
use crate::db::map_sqlx_error;

const SELECT_COLUMNS: &str = r#"
    SELECT event, job_id, correlation_id, status, retries, error_log,
           notification_id, user_id, stage, created_at
    FROM notification_audit_log
"#;

#[derive(Debug, Clone)]
pub struct PostgresAuditLog {
    pool: Arc<PgPool>,
}

impl PostgresAuditLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    async fn query_by(&self, column: &str, id: Uuid, operation: &str) -> Result<Vec<AuditEntry>, AuditError> {
        let sql = format!("{SELECT_COLUMNS} WHERE {column} = $1 ORDER BY created_at ASC, id ASC");
        let rows = sqlx::query(&sql)
            .bind(id)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| AuditError::Storage(map_sqlx_error(operation, e)))?;

        rows.iter().map(entry_from_row).collect()
    }
}

#[async_trait]
impl AuditSink for PostgresAuditLog {
    #[instrument(skip(self, entry), fields(event = %entry.event, job_id = ?entry.job_id), err)]
    async fn append(&self, entry: AuditEntry) -> Result<(), AuditError> {
        sqlx::query(
            r#"
            INSERT INTO notification_audit_log (
                event, job_id, correlation_id, status, retries, error_log,
                notification_id, user_id, stage, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&entry.event)
        .bind(entry.job_id.map(Uuid::from))
        .bind(entry.correlation_id.map(Uuid::from))
        .bind(entry.status.as_str())
        .bind(entry.retries as i32)
        .bind(entry.error_log.as_deref())
        .bind(entry.notification_id.map(Uuid::from))
        .bind(entry.user_id.map(Uuid::from))
        .bind(entry.stage.as_deref())
        .bind(entry.created_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| AuditError::Storage(map_sqlx_error("append_audit", e)))?;

        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn by_job(&self, job_id: JobId) -> Result<Vec<AuditEntry>, AuditError> {
        self.query_by("job_id", job_id.into(), "audit_by_job").await
    }

    #[instrument(skip(self), fields(correlation_id = %correlation_id), err)]
    async fn by_correlation(&self, correlation_id: CorrelationId) -> Result<Vec<AuditEntry>, AuditError> {
        self.query_by("correlation_id", correlation_id.into(), "audit_by_correlation")
            .await
    }
}

fn entry_from_row(row: &PgRow) -> Result<AuditEntry, AuditError> {
    let decode = |e: sqlx::Error| AuditError::Storage(format!("failed to decode audit row: {e}"));

    let status: String = row.try_get("status").map_err(decode)?;
    let status = AuditStatus::parse(&status)
        .ok_or_else(|| AuditError::Storage(format!("unknown audit status: {status}")))?;
    let retries: i32 = row.try_get("retries").map_err(decode)?;

    Ok(AuditEntry {
        event: row.try_get("event").map_err(decode)?,
        job_id: row.try_get::<Option<Uuid>, _>("job_id").map_err(decode)?.map(JobId::from),
        correlation_id: row
            .try_get::<Option<Uuid>, _>("correlation_id")
            .map_err(decode)?
            .map(CorrelationId::from),
        status,
        retries: retries.max(0) as u32,
        error_log: row.try_get("error_log").map_err(decode)?,
        notification_id: row
            .try_get::<Option<Uuid>, _>("notification_id")
            .map_err(decode)?
            .map(NotificationId::from),
        user_id: row.try_get::<Option<Uuid>, _>("user_id").map_err(decode)?.map(UserId::from),
        stage: row.try_get("stage").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
    })
}
