//! Collaborator contracts consumed by the pipeline.
//!
//! The pipeline only touches accounts, preferences and notification rows
//! through these narrow traits; schema and CRUD live elsewhere.

mod in_memory;
mod postgres;

pub use in_memory::{InMemoryAccountDirectory, InMemoryNotificationStore, InMemoryPreferenceStore};
pub use postgres::{PostgresAccountDirectory, PostgresNotificationStore, PostgresPreferenceStore};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use talentbridge_core::{JobId, NotificationId, UserId};
use talentbridge_notifications::{NewNotification, Notification, Preference};

/// Repository error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository storage error: {0}")]
    Storage(String),
    #[error("repository decode error: {0}")]
    Decode(String),
    #[error("repository lock poisoned")]
    Poisoned,
}

/// Account status as seen by the permission check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Account {
    pub fn active(id: UserId) -> Self {
        Self {
            id,
            active: true,
            deleted_at: None,
        }
    }

    pub fn inactive(id: UserId) -> Self {
        Self {
            id,
            active: false,
            deleted_at: None,
        }
    }

    /// Active and not soft-deleted.
    pub fn is_usable(&self) -> bool {
        self.active && self.deleted_at.is_none()
    }
}

#[async_trait]
pub trait AccountDirectory: Send + Sync {
    /// Batched lookup; missing ids are simply absent from the result.
    async fn find_accounts_by_ids(&self, ids: &[UserId]) -> Result<Vec<Account>, RepositoryError>;
}

#[async_trait]
pub trait PreferenceStore: Send + Sync {
    /// Every preference row of one user (one per notification type).
    async fn find_preferences(&self, user_id: UserId) -> Result<Vec<Preference>, RepositoryError>;

    /// Insert or replace the row for `(user_id, kind)`.
    async fn upsert(&self, preference: Preference) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist the notification of a job. Keyed by job id: a second call for
    /// the same job returns the existing row instead of creating another.
    async fn upsert_for_job(&self, notification: NewNotification) -> Result<Notification, RepositoryError>;

    async fn get(&self, id: NotificationId) -> Result<Option<Notification>, RepositoryError>;

    async fn find_by_job(&self, job_id: JobId) -> Result<Option<Notification>, RepositoryError>;

    /// Mark a row ready for client pull. Returns false if it does not exist.
    async fn mark_delivered(&self, id: NotificationId, at: DateTime<Utc>) -> Result<bool, RepositoryError>;

    /// A user's notifications, newest first.
    async fn list_for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Notification>, RepositoryError>;
}
