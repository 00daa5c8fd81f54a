//! Notification payload envelope.
//!
//! Producers hand over loosely-shaped JSON. It is checked once, at the queue
//! boundary, and from then on travels as a fixed envelope with an explicit
//! extension map for anything the pipeline does not interpret.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use talentbridge_core::{DomainError, DomainResult, UserId};

/// Notification type tag (e.g. `connect_request`, `contest_reminder`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationType(String);

impl NotificationType {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for NotificationType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NotificationType {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Payload carried by every notification job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub sender_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient_id: Option<UserId>,
    /// Owner of the persisted notification.
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    #[serde(default)]
    pub content: String,
    /// Producer-specific fields, carried verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

const REQUIRED_FIELDS: [&str; 3] = ["senderId", "userId", "type"];

impl NotificationPayload {
    pub fn new(
        sender_id: UserId,
        user_id: UserId,
        kind: impl Into<NotificationType>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender_id,
            recipient_id: None,
            user_id,
            kind: kind.into(),
            content: content.into(),
            extra: Map::new(),
        }
    }

    pub fn with_recipient(mut self, recipient_id: UserId) -> Self {
        self.recipient_id = Some(recipient_id);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Build a payload from producer JSON, failing fast on missing fields.
    pub fn from_json(value: Value) -> DomainResult<Self> {
        let Some(object) = value.as_object() else {
            return Err(DomainError::validation("payload must be a JSON object"));
        };

        for field in REQUIRED_FIELDS {
            if object.get(field).is_none_or(Value::is_null) {
                return Err(DomainError::validation(format!("{field} is required")));
            }
        }

        serde_json::from_value(value)
            .map_err(|e| DomainError::validation(format!("malformed payload: {e}")))
    }

    /// Account the permission check treats as the recipient.
    pub fn recipient(&self) -> UserId {
        self.recipient_id.unwrap_or(self.user_id)
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ids() -> (UserId, UserId) {
        (UserId::new(), UserId::new())
    }

    #[test]
    fn missing_sender_is_rejected() {
        let (_, user) = ids();
        let err = NotificationPayload::from_json(json!({
            "userId": user,
            "type": "connect_request",
            "content": "hi",
        }))
        .unwrap_err();

        assert!(err.to_string().contains("senderId is required"));
    }

    #[test]
    fn null_required_field_counts_as_missing() {
        let (sender, _) = ids();
        let err = NotificationPayload::from_json(json!({
            "senderId": sender,
            "userId": null,
            "type": "connect_request",
        }))
        .unwrap_err();

        assert!(err.to_string().contains("userId is required"));
    }

    #[test]
    fn unknown_fields_land_in_extra() {
        let (sender, user) = ids();
        let payload = NotificationPayload::from_json(json!({
            "senderId": sender,
            "userId": user,
            "type": "contest_reminder",
            "content": "starts in 1h",
            "contestId": 42,
        }))
        .unwrap();

        assert_eq!(payload.kind.as_str(), "contest_reminder");
        assert_eq!(payload.extra.get("contestId"), Some(&json!(42)));
        assert_eq!(payload.to_json()["contestId"], json!(42));
    }

    #[test]
    fn recipient_defaults_to_owner() {
        let (sender, user) = ids();
        let payload = NotificationPayload::new(sender, user, "connect_request", "hi");
        assert_eq!(payload.recipient(), user);

        let other = UserId::new();
        assert_eq!(payload.with_recipient(other).recipient(), other);
    }

    #[test]
    fn content_defaults_to_empty() {
        let (sender, user) = ids();
        let payload = NotificationPayload::from_json(json!({
            "senderId": sender,
            "userId": user,
            "type": "profile_view",
        }))
        .unwrap();
        assert!(payload.content.is_empty());
    }

    #[test]
    fn malformed_ids_are_rejected() {
        let (_, user) = ids();
        let err = NotificationPayload::from_json(json!({
            "senderId": "not-a-uuid",
            "userId": user,
            "type": "connect_request",
        }))
        .unwrap_err();
        assert!(err.to_string().contains("malformed payload"));
    }
}
