//! In-app channel: confirms the persisted notification is ready for client pull.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use talentbridge_notifications::Channel;

use super::{ChannelFailure, DeliveryChannel, DeliveryContext};
use crate::repositories::NotificationStore;

#[derive(Clone)]
pub struct InAppChannel {
    notifications: Arc<dyn NotificationStore>,
}

impl InAppChannel {
    pub fn new(notifications: Arc<dyn NotificationStore>) -> Self {
        Self { notifications }
    }
}

#[async_trait]
impl DeliveryChannel for InAppChannel {
    fn channel(&self) -> Channel {
        Channel::InApp
    }

    async fn deliver(&self, ctx: &DeliveryContext) -> Result<(), ChannelFailure> {
        let id = ctx.notification_id.ok_or(ChannelFailure::MissingNotificationId)?;
        let found = self
            .notifications
            .mark_delivered(id, Utc::now())
            .await
            .map_err(|e| ChannelFailure::Storage(e.to_string()))?;

        if found {
            Ok(())
        } else {
            Err(ChannelFailure::NotificationNotFound(id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use talentbridge_core::{CorrelationId, JobId, NotificationId, UserId};
    use talentbridge_notifications::{NewNotification, NotificationPayload};

    use crate::repositories::InMemoryNotificationStore;

    fn ctx(notification_id: Option<NotificationId>) -> DeliveryContext {
        DeliveryContext {
            job_id: JobId::new(),
            correlation_id: CorrelationId::new(),
            notification_id,
            recipient: UserId::new(),
            kind: "connect_request".into(),
            content: "hi".into(),
            payload: json!({}),
        }
    }

    #[tokio::test]
    async fn marks_existing_row_delivered() {
        let store = Arc::new(InMemoryNotificationStore::new());
        let payload = NotificationPayload::new(UserId::new(), UserId::new(), "connect_request", "hi");
        let row = store
            .upsert_for_job(NewNotification::from_payload(JobId::new(), &payload))
            .await
            .unwrap();

        InAppChannel::new(store.clone()).deliver(&ctx(Some(row.id))).await.unwrap();
        assert!(store.get(row.id).await.unwrap().unwrap().delivered_at.is_some());
    }

    #[tokio::test]
    async fn missing_row_is_a_failure() {
        let channel = InAppChannel::new(Arc::new(InMemoryNotificationStore::new()));
        assert!(matches!(
            channel.deliver(&ctx(Some(NotificationId::new()))).await,
            Err(ChannelFailure::NotificationNotFound(_))
        ));
        assert!(matches!(
            channel.deliver(&ctx(None)).await,
            Err(ChannelFailure::MissingNotificationId)
        ));
    }
}
