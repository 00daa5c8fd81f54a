//! Postgres-backed collaborator repositories.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::instrument;
use uuid::Uuid;

use talentbridge_core::{JobId, NotificationId, UserId};
use talentbridge_notifications::{NewNotification, Notification, NotificationType, Preference};

use super::{Account, AccountDirectory, NotificationStore, PreferenceStore, RepositoryError};
use crate::db::map_sqlx_error;

fn storage(operation: &str) -> impl FnOnce(sqlx::Error) -> RepositoryError + '_ {
    move |e| RepositoryError::Storage(map_sqlx_error(operation, e))
}

fn decode(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(e.to_string())
}

/// Reads the platform's `accounts` table.
#[derive(Debug, Clone)]
pub struct PostgresAccountDirectory {
    pool: Arc<PgPool>,
}

impl PostgresAccountDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl AccountDirectory for PostgresAccountDirectory {
    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn find_accounts_by_ids(&self, ids: &[UserId]) -> Result<Vec<Account>, RepositoryError> {
        let ids: Vec<Uuid> = ids.iter().copied().map(Uuid::from).collect();
        let rows = sqlx::query("SELECT id, active, deleted_at FROM accounts WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&*self.pool)
            .await
            .map_err(storage("find_accounts_by_ids"))?;

        rows.iter()
            .map(|row| {
                Ok(Account {
                    id: UserId::from(row.try_get::<Uuid, _>("id").map_err(decode)?),
                    active: row.try_get("active").map_err(decode)?,
                    deleted_at: row.try_get("deleted_at").map_err(decode)?,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct PostgresPreferenceStore {
    pool: Arc<PgPool>,
}

impl PostgresPreferenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

#[async_trait]
impl PreferenceStore for PostgresPreferenceStore {
    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn find_preferences(&self, user_id: UserId) -> Result<Vec<Preference>, RepositoryError> {
        let rows = sqlx::query(
            r#"
            SELECT user_id, type, email, in_app, enabled
            FROM notification_preferences
            WHERE user_id = $1
            "#,
        )
        .bind(Uuid::from(user_id))
        .fetch_all(&*self.pool)
        .await
        .map_err(storage("find_preferences"))?;

        rows.iter()
            .map(|row| {
                Ok(Preference {
                    user_id: UserId::from(row.try_get::<Uuid, _>("user_id").map_err(decode)?),
                    kind: NotificationType::new(row.try_get::<String, _>("type").map_err(decode)?),
                    email: row.try_get("email").map_err(decode)?,
                    in_app: row.try_get("in_app").map_err(decode)?,
                    enabled: row.try_get("enabled").map_err(decode)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self, preference), fields(user_id = %preference.user_id, kind = %preference.kind), err)]
    async fn upsert(&self, preference: Preference) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO notification_preferences (user_id, type, email, in_app, enabled, updated_at)
            VALUES ($1, $2, $3, $4, $5, now())
            ON CONFLICT (user_id, type) DO UPDATE
            SET email = EXCLUDED.email,
                in_app = EXCLUDED.in_app,
                enabled = EXCLUDED.enabled,
                updated_at = now()
            "#,
        )
        .bind(Uuid::from(preference.user_id))
        .bind(preference.kind.as_str())
        .bind(preference.email)
        .bind(preference.in_app)
        .bind(preference.enabled)
        .execute(&*self.pool)
        .await
        .map_err(storage("upsert_preference"))?;

        Ok(())
    }
}

const NOTIFICATION_COLUMNS: &str =
    "id, job_id, user_id, content, payload, type, read, delivery_method, created_at, delivered_at";

#[derive(Debug, Clone)]
pub struct PostgresNotificationStore {
    pool: Arc<PgPool>,
}

impl PostgresNotificationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }
}

fn notification_from_row(row: &PgRow) -> Result<Notification, RepositoryError> {
    Ok(Notification {
        id: NotificationId::from(row.try_get::<Uuid, _>("id").map_err(decode)?),
        job_id: JobId::from(row.try_get::<Uuid, _>("job_id").map_err(decode)?),
        user_id: UserId::from(row.try_get::<Uuid, _>("user_id").map_err(decode)?),
        content: row.try_get("content").map_err(decode)?,
        payload: row.try_get("payload").map_err(decode)?,
        kind: NotificationType::new(row.try_get::<String, _>("type").map_err(decode)?),
        read: row.try_get("read").map_err(decode)?,
        delivery_method: row.try_get("delivery_method").map_err(decode)?,
        created_at: row.try_get("created_at").map_err(decode)?,
        delivered_at: row.try_get("delivered_at").map_err(decode)?,
    })
}

#[async_trait]
impl NotificationStore for PostgresNotificationStore {
    #[instrument(skip(self, notification), fields(job_id = %notification.job_id), err)]
    async fn upsert_for_job(&self, notification: NewNotification) -> Result<Notification, RepositoryError> {
        // The no-op update makes RETURNING yield the existing row on conflict.
        let sql = format!(
            r#"
            INSERT INTO notifications (
                id, job_id, user_id, content, payload, type, read, delivery_method, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now())
            ON CONFLICT (job_id) DO UPDATE SET job_id = EXCLUDED.job_id
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        );

        let row = sqlx::query(&sql)
            .bind(Uuid::from(NotificationId::new()))
            .bind(Uuid::from(notification.job_id))
            .bind(Uuid::from(notification.user_id))
            .bind(&notification.content)
            .bind(Json(&notification.payload))
            .bind(notification.kind.as_str())
            .bind(notification.read)
            .bind(&notification.delivery_method)
            .fetch_one(&*self.pool)
            .await
            .map_err(storage("upsert_notification"))?;

        notification_from_row(&row)
    }

    #[instrument(skip(self), fields(notification_id = %id), err)]
    async fn get(&self, id: NotificationId) -> Result<Option<Notification>, RepositoryError> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1");
        let row = sqlx::query(&sql)
            .bind(Uuid::from(id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage("get_notification"))?;

        row.as_ref().map(notification_from_row).transpose()
    }

    #[instrument(skip(self), fields(job_id = %job_id), err)]
    async fn find_by_job(&self, job_id: JobId) -> Result<Option<Notification>, RepositoryError> {
        let sql = format!("SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE job_id = $1");
        let row = sqlx::query(&sql)
            .bind(Uuid::from(job_id))
            .fetch_optional(&*self.pool)
            .await
            .map_err(storage("find_notification_by_job"))?;

        row.as_ref().map(notification_from_row).transpose()
    }

    #[instrument(skip(self), fields(notification_id = %id), err)]
    async fn mark_delivered(&self, id: NotificationId, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let result = sqlx::query(
            "UPDATE notifications SET delivered_at = COALESCE(delivered_at, $2) WHERE id = $1",
        )
        .bind(Uuid::from(id))
        .bind(at)
        .execute(&*self.pool)
        .await
        .map_err(storage("mark_delivered"))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(user_id = %user_id), err)]
    async fn list_for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Notification>, RepositoryError> {
        let sql = format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE user_id = $1 \
             ORDER BY created_at DESC LIMIT $2"
        );
        let rows = sqlx::query(&sql)
            .bind(Uuid::from(user_id))
            .bind(limit as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(storage("list_notifications"))?;

        rows.iter().map(notification_from_row).collect()
    }
}
