use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use talentbridge_core::{JobId, NotificationId, UserId};
use talentbridge_notifications::{NewNotification, Notification, NotificationType, Preference};

use super::{Account, AccountDirectory, NotificationStore, PreferenceStore, RepositoryError};

/// In-memory account directory for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryAccountDirectory {
    accounts: RwLock<HashMap<UserId, Account>>,
}

impl InMemoryAccountDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, account: Account) {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts.insert(account.id, account);
        }
    }

    pub fn set_active(&self, id: UserId, active: bool) {
        if let Ok(mut accounts) = self.accounts.write() {
            accounts
                .entry(id)
                .and_modify(|a| a.active = active)
                .or_insert(Account {
                    id,
                    active,
                    deleted_at: None,
                });
        }
    }
}

#[async_trait]
impl AccountDirectory for InMemoryAccountDirectory {
    async fn find_accounts_by_ids(&self, ids: &[UserId]) -> Result<Vec<Account>, RepositoryError> {
        let accounts = self.accounts.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(ids.iter().filter_map(|id| accounts.get(id).cloned()).collect())
    }
}

/// In-memory preference store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryPreferenceStore {
    rows: RwLock<HashMap<(UserId, NotificationType), Preference>>,
}

impl InMemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for InMemoryPreferenceStore {
    async fn find_preferences(&self, user_id: UserId) -> Result<Vec<Preference>, RepositoryError> {
        let rows = self.rows.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(rows.values().filter(|p| p.user_id == user_id).cloned().collect())
    }

    async fn upsert(&self, preference: Preference) -> Result<(), RepositoryError> {
        let mut rows = self.rows.write().map_err(|_| RepositoryError::Poisoned)?;
        rows.insert((preference.user_id, preference.kind.clone()), preference);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct NotificationRows {
    by_id: HashMap<NotificationId, Notification>,
    by_job: HashMap<JobId, NotificationId>,
}

/// In-memory notification store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryNotificationStore {
    rows: RwLock<NotificationRows>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.read().map(|r| r.by_id.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl NotificationStore for InMemoryNotificationStore {
    async fn upsert_for_job(&self, notification: NewNotification) -> Result<Notification, RepositoryError> {
        let mut rows = self.rows.write().map_err(|_| RepositoryError::Poisoned)?;

        if let Some(existing) = rows.by_job.get(&notification.job_id).and_then(|id| rows.by_id.get(id)) {
            return Ok(existing.clone());
        }

        let job_id = notification.job_id;
        let row = notification.into_notification(NotificationId::new(), Utc::now());
        rows.by_job.insert(job_id, row.id);
        rows.by_id.insert(row.id, row.clone());
        Ok(row)
    }

    async fn get(&self, id: NotificationId) -> Result<Option<Notification>, RepositoryError> {
        let rows = self.rows.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(rows.by_id.get(&id).cloned())
    }

    async fn find_by_job(&self, job_id: JobId) -> Result<Option<Notification>, RepositoryError> {
        let rows = self.rows.read().map_err(|_| RepositoryError::Poisoned)?;
        Ok(rows.by_job.get(&job_id).and_then(|id| rows.by_id.get(id)).cloned())
    }

    async fn mark_delivered(&self, id: NotificationId, at: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut rows = self.rows.write().map_err(|_| RepositoryError::Poisoned)?;
        match rows.by_id.get_mut(&id) {
            Some(row) => {
                row.delivered_at.get_or_insert(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_for_user(&self, user_id: UserId, limit: usize) -> Result<Vec<Notification>, RepositoryError> {
        let rows = self.rows.read().map_err(|_| RepositoryError::Poisoned)?;
        let mut matched: Vec<Notification> = rows.by_id.values().filter(|n| n.user_id == user_id).cloned().collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(limit);
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use talentbridge_notifications::NotificationPayload;

    #[tokio::test]
    async fn notification_upsert_is_idempotent_per_job() {
        let store = InMemoryNotificationStore::new();
        let job_id = JobId::new();
        let payload = NotificationPayload::new(UserId::new(), UserId::new(), "connect_request", "hello");

        let first = store
            .upsert_for_job(NewNotification::from_payload(job_id, &payload))
            .await
            .unwrap();
        let second = store
            .upsert_for_job(NewNotification::from_payload(job_id, &payload))
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.content, "hello");
        assert_eq!(store.len(), 1);
        assert_eq!(store.find_by_job(job_id).await.unwrap().map(|n| n.id), Some(first.id));
    }

    #[tokio::test]
    async fn mark_delivered_reports_missing_rows() {
        let store = InMemoryNotificationStore::new();
        assert!(!store.mark_delivered(NotificationId::new(), Utc::now()).await.unwrap());
    }

    #[tokio::test]
    async fn preference_upsert_replaces_row_for_type() {
        let store = InMemoryPreferenceStore::new();
        let user = UserId::new();
        let mut pref = Preference {
            user_id: user,
            kind: NotificationType::new("connect_request"),
            email: true,
            in_app: true,
            enabled: true,
        };
        store.upsert(pref.clone()).await.unwrap();
        pref.email = false;
        store.upsert(pref.clone()).await.unwrap();

        let rows = store.find_preferences(user).await.unwrap();
        assert_eq!(rows, vec![pref]);
    }

    #[tokio::test]
    async fn account_lookup_skips_unknown_ids() {
        let directory = InMemoryAccountDirectory::new();
        let known = UserId::new();
        directory.upsert(Account::active(known));

        let found = directory.find_accounts_by_ids(&[known, UserId::new()]).await.unwrap();
        assert_eq!(found, vec![Account::active(known)]);
    }
}
