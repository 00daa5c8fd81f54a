//! Postgres-backed job queue (`notification_jobs` table).
//!
//! The full [`Job`] lives in the `body` JSONB column; the columns the queue
//! orders and filters on are mirrored next to it:
//!
//! - `priority`, `enqueue_seq`: claim order (rank first, FIFO within a rank)
//! - `state`, `run_at`: eligibility
//! - `lease_expires_at`: when an unsettled active row may be taken back
//! - `finished_at`, `failed_reason`: status normalization without decoding `body`
//!
//! `claim_next` locks the head row with `FOR UPDATE SKIP LOCKED`, so
//! concurrent workers never claim the same job and never block each other.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgExecutor, PgPool, Row};
use tracing::{instrument, warn};
use uuid::Uuid;

use talentbridge_core::JobId;
use talentbridge_notifications::{Job, JobState, NormalizedState, StateCounts};

use super::store::{DEFAULT_LEASE, JobStore, QueueError};
use crate::db::map_sqlx_error;

#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: Arc<PgPool>,
    lease: Duration,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            lease: DEFAULT_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

fn storage(operation: &str) -> impl FnOnce(sqlx::Error) -> QueueError + '_ {
    move |e| QueueError::Storage(map_sqlx_error(operation, e))
}

fn decode_body(row: &PgRow) -> Result<Job, QueueError> {
    let body: serde_json::Value = row
        .try_get("body")
        .map_err(|e| QueueError::Serialization(format!("failed to read job body: {e}")))?;
    serde_json::from_value(body).map_err(|e| QueueError::Serialization(e.to_string()))
}

/// Write every mirrored column plus `body` for an existing row.
async fn write_job<'e>(conn: impl PgExecutor<'e>, job: &Job, operation: &str) -> Result<u64, QueueError> {
    let result = sqlx::query(
        r#"
        UPDATE notification_jobs
        SET state = $2, run_at = $3, finished_at = $4, failed_reason = $5,
            progress = $6, lease_expires_at = $7, body = $8, updated_at = now()
        WHERE id = $1
        "#,
    )
    .bind(Uuid::from(job.id))
    .bind(job.state.as_str())
    .bind(job.run_at)
    .bind(job.finished_at)
    .bind(job.failed_reason.as_deref())
    .bind(job.progress as i16)
    .bind(job.lease_expires_at)
    .bind(Json(job))
    .execute(conn)
    .await
    .map_err(storage(operation))?;

    Ok(result.rows_affected())
}

/// SQL predicate selecting one normalized state; `$1` is `now`.
fn state_predicate(state: NormalizedState) -> &'static str {
    match state {
        NormalizedState::Failed => "failed_reason IS NOT NULL",
        NormalizedState::Completed => "failed_reason IS NULL AND finished_at IS NOT NULL",
        NormalizedState::Active => "failed_reason IS NULL AND finished_at IS NULL AND state = 'active'",
        NormalizedState::Waiting => {
            "failed_reason IS NULL AND finished_at IS NULL AND state = 'waiting' AND run_at <= $1"
        }
        NormalizedState::Delayed => {
            "failed_reason IS NULL AND finished_at IS NULL AND state = 'waiting' AND run_at > $1"
        }
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(job_id = %job.id, priority = %job.priority), err)]
    async fn enqueue(&self, job: Job) -> Result<JobId, QueueError> {
        let result = sqlx::query(
            r#"
            INSERT INTO notification_jobs (
                id, priority, state, run_at, finished_at, failed_reason, progress, body, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(Uuid::from(job.id))
        .bind(job.priority.rank())
        .bind(job.state.as_str())
        .bind(job.run_at)
        .bind(job.finished_at)
        .bind(job.failed_reason.as_deref())
        .bind(job.progress as i16)
        .bind(Json(&job))
        .bind(job.created_at)
        .execute(&*self.pool)
        .await
        .map_err(storage("enqueue_job"))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::AlreadyExists(job.id));
        }
        Ok(job.id)
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn get(&self, job_id: JobId) -> Result<Option<Job>, QueueError> {
        let row = sqlx::query("SELECT body FROM notification_jobs WHERE id = $1")
            .bind(Uuid::from(job_id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage("get_job"))?;

        row.as_ref().map(decode_body).transpose()
    }

    #[instrument(skip(self), err)]
    async fn claim_next(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError> {
        loop {
            let mut tx = self.pool.begin().await.map_err(storage("claim_begin"))?;

            let row = sqlx::query(
                r#"
                SELECT id, body
                FROM notification_jobs
                WHERE (state = 'waiting' AND run_at <= $1)
                   OR (state = 'active' AND lease_expires_at <= $1)
                ORDER BY priority ASC, enqueue_seq ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
                "#,
            )
            .bind(now)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage("claim_select"))?;

            let Some(row) = row else {
                tx.commit().await.map_err(storage("claim_commit"))?;
                return Ok(None);
            };

            let id: Uuid = row.try_get("id").map_err(storage("claim_select"))?;
            let mut job = match decode_body(&row) {
                Ok(job) => job,
                Err(err) => {
                    // Undeserializable payloads can never succeed: fail permanently.
                    warn!(job_id = %id, error = %err, "stored job no longer deserializes, failing it");
                    sqlx::query(
                        r#"
                        UPDATE notification_jobs
                        SET state = 'failed', failed_reason = $2, finished_at = $3,
                            lease_expires_at = NULL, updated_at = now()
                        WHERE id = $1
                        "#,
                    )
                    .bind(id)
                    .bind(format!("undeserializable job: {err}"))
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage("claim_fail_corrupt"))?;
                    tx.commit().await.map_err(storage("claim_commit"))?;
                    return Ok(None);
                }
            };

            if job.is_lease_expired(now) {
                job.expire_lease(now);
                warn!(job_id = %job.id, attempts = job.attempts, state = job.state.as_str(), "reclaimed job with expired lease");
                if job.state == JobState::Failed {
                    write_job(&mut *tx, &job, "claim_fail_expired").await?;
                    tx.commit().await.map_err(storage("claim_commit"))?;
                    continue;
                }
            }

            job.claim(now, self.lease);
            write_job(&mut *tx, &job, "claim_update").await?;
            tx.commit().await.map_err(storage("claim_commit"))?;
            return Ok(Some(job));
        }
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn update_progress(&self, job_id: JobId, progress: u8) -> Result<(), QueueError> {
        let progress = progress.min(100) as i16;
        let result = sqlx::query(
            r#"
            UPDATE notification_jobs
            SET progress = $2,
                body = jsonb_set(body, '{progress}', to_jsonb($2::smallint)),
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(Uuid::from(job_id))
        .bind(progress)
        .execute(&*self.pool)
        .await
        .map_err(storage("update_progress"))?;

        if result.rows_affected() == 0 {
            return Err(QueueError::NotFound(job_id));
        }
        Ok(())
    }

    #[instrument(skip(self, job), fields(job_id = %job.id, state = job.state.as_str()), err)]
    async fn save(&self, job: &Job) -> Result<(), QueueError> {
        if write_job(&*self.pool, job, "save_job").await? == 0 {
            return Err(QueueError::NotFound(job.id));
        }
        Ok(())
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn remove(&self, job_id: JobId) -> Result<(), QueueError> {
        sqlx::query("DELETE FROM notification_jobs WHERE id = $1")
            .bind(Uuid::from(job_id))
            .execute(&*self.pool)
            .await
            .map_err(storage("remove_job"))?;
        Ok(())
    }

    #[instrument(skip(self), err)]
    async fn list(
        &self,
        state: Option<NormalizedState>,
        offset: usize,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, QueueError> {
        let predicate = state.map(state_predicate).unwrap_or("$1 IS NOT NULL");
        let sql = format!(
            "SELECT id, body FROM notification_jobs WHERE {predicate} \
             ORDER BY enqueue_seq ASC OFFSET $2 LIMIT $3"
        );

        let rows = sqlx::query(&sql)
            .bind(now)
            .bind(offset as i64)
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(storage("list_jobs"))?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in &rows {
            match decode_body(row) {
                Ok(job) => jobs.push(job),
                Err(err) => {
                    let id: Option<Uuid> = row.try_get("id").ok();
                    warn!(job_id = ?id, error = %err, "skipping undecodable job row");
                }
            }
        }
        Ok(jobs)
    }

    #[instrument(skip(self), err)]
    async fn counts(&self, now: DateTime<Utc>) -> Result<StateCounts, QueueError> {
        let sql = format!(
            "SELECT \
               COUNT(*) FILTER (WHERE {waiting}) AS waiting, \
               COUNT(*) FILTER (WHERE {active}) AS active, \
               COUNT(*) FILTER (WHERE {completed}) AS completed, \
               COUNT(*) FILTER (WHERE {failed}) AS failed, \
               COUNT(*) FILTER (WHERE {delayed}) AS delayed \
             FROM notification_jobs",
            waiting = state_predicate(NormalizedState::Waiting),
            active = state_predicate(NormalizedState::Active),
            completed = state_predicate(NormalizedState::Completed),
            failed = state_predicate(NormalizedState::Failed),
            delayed = state_predicate(NormalizedState::Delayed),
        );

        let row = sqlx::query(&sql)
            .bind(now)
            .fetch_one(&*self.pool)
            .await
            .map_err(storage("count_jobs"))?;

        let count = |column: &str| -> Result<usize, QueueError> {
            let n: i64 = row.try_get(column).map_err(storage("count_jobs"))?;
            Ok(n.max(0) as usize)
        };

        Ok(StateCounts {
            waiting: count("waiting")?,
            active: count("active")?,
            completed: count("completed")?,
            failed: count("failed")?,
            delayed: count("delayed")?,
        })
    }
}
