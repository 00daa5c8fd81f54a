//! Persisted, user-visible notification records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use talentbridge_core::{JobId, NotificationId, UserId};

use crate::payload::{NotificationPayload, NotificationType};

/// Delivery method recorded on a notification before fan-out.
pub const DEFAULT_DELIVERY_METHOD: &str = "in_app";

/// Durable trace of a delivered-or-attempted job.
///
/// One per job: the store upserts on `job_id`, so re-persisting on retry
/// keeps the original `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub job_id: JobId,
    pub user_id: UserId,
    pub content: String,
    /// Producer payload, verbatim.
    pub payload: Value,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub read: bool,
    pub delivery_method: String,
    pub created_at: DateTime<Utc>,
    /// Set by the in-app channel once the row is ready for client pull.
    pub delivered_at: Option<DateTime<Utc>>,
}

/// Write model for [`Notification`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub job_id: JobId,
    pub user_id: UserId,
    pub content: String,
    pub payload: Value,
    pub kind: NotificationType,
    pub read: bool,
    pub delivery_method: String,
}

impl NewNotification {
    pub fn from_payload(job_id: JobId, payload: &NotificationPayload) -> Self {
        Self {
            job_id,
            user_id: payload.user_id,
            content: payload.content.clone(),
            payload: payload.to_json(),
            kind: payload.kind.clone(),
            read: false,
            delivery_method: DEFAULT_DELIVERY_METHOD.to_string(),
        }
    }

    pub fn with_delivery_method(mut self, method: impl Into<String>) -> Self {
        self.delivery_method = method.into();
        self
    }

    pub fn into_notification(self, id: NotificationId, now: DateTime<Utc>) -> Notification {
        Notification {
            id,
            job_id: self.job_id,
            user_id: self.user_id,
            content: self.content,
            payload: self.payload,
            kind: self.kind,
            read: self.read,
            delivery_method: self.delivery_method,
            created_at: now,
            delivered_at: None,
        }
    }
}
