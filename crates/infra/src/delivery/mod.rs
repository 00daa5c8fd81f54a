//! Multi-channel delivery fan-out.
//!
//! One attempt per enabled channel, run concurrently. A channel failure is
//! converted into a failed [`DeliveryResult`] at this boundary and never
//! cancels its siblings; the worker decides whether the job is retried.

pub mod email;
pub mod in_app;
pub mod socket;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};

use talentbridge_core::{CorrelationId, JobId, NotificationId, UserId};
use talentbridge_notifications::audit::events;
use talentbridge_notifications::{
    AuditEntry, AuditStatus, Channel, DeliveryError, DeliveryResult, Job, NotificationType,
};

use crate::audit::AuditRecorder;

pub use email::{EmailChannel, LogMailTransport, MailError, MailMessage, MailTransport};
pub use in_app::InAppChannel;
pub use socket::{RealtimeMessage, SessionRegistry, SocketChannel};

/// Everything a channel needs to deliver one notification.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryContext {
    pub job_id: JobId,
    pub correlation_id: CorrelationId,
    pub notification_id: Option<NotificationId>,
    pub recipient: UserId,
    pub kind: NotificationType,
    pub content: String,
    pub payload: Value,
}

impl DeliveryContext {
    pub fn for_job(job: &Job, notification_id: Option<NotificationId>, correlation_id: CorrelationId) -> Self {
        Self {
            job_id: job.id,
            correlation_id,
            notification_id,
            recipient: job.payload.user_id,
            kind: job.payload.kind.clone(),
            content: job.payload.content.clone(),
            payload: job.payload.to_json(),
        }
    }
}

/// Why a single channel attempt did not go through.
#[derive(Debug, thiserror::Error)]
pub enum ChannelFailure {
    #[error("no notification row to deliver")]
    MissingNotificationId,

    #[error("notification {0} not found")]
    NotificationNotFound(NotificationId),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("no handler registered for channel")]
    Unregistered,
}

#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    fn channel(&self) -> Channel;

    async fn deliver(&self, ctx: &DeliveryContext) -> Result<(), ChannelFailure>;
}

#[derive(Clone)]
pub struct DeliveryCoordinator {
    channels: HashMap<Channel, Arc<dyn DeliveryChannel>>,
    audit: AuditRecorder,
}

impl DeliveryCoordinator {
    pub fn new(audit: AuditRecorder) -> Self {
        Self {
            channels: HashMap::new(),
            audit,
        }
    }

    /// Register (or replace) the handler for its channel.
    pub fn with_channel(mut self, handler: Arc<dyn DeliveryChannel>) -> Self {
        self.channels.insert(handler.channel(), handler);
        self
    }

    /// Deliver over every channel in `enabled` and return one result per channel,
    /// in the same order.
    pub async fn coordinate_delivery(
        &self,
        job: &Job,
        enabled: &[Channel],
        notification_id: Option<NotificationId>,
        correlation_id: CorrelationId,
    ) -> Vec<DeliveryResult> {
        let ctx = DeliveryContext::for_job(job, notification_id, correlation_id);

        let attempts = enabled.iter().map(|&channel| {
            let ctx = &ctx;
            async move {
                let outcome = match self.channels.get(&channel) {
                    Some(handler) => handler.deliver(ctx).await,
                    None => Err(ChannelFailure::Unregistered),
                };

                match outcome {
                    Ok(()) => {
                        debug!(job_id = %job.id, correlation_id = %correlation_id, channel = channel.as_str(), "channel delivered");
                        self.audit
                            .record(
                                AuditEntry::new(events::CHANNEL_DELIVERED, AuditStatus::Success)
                                    .job(job.id)
                                    .correlation(correlation_id)
                                    .retries(job.attempts)
                                    .notification(notification_id)
                                    .user(ctx.recipient)
                                    .stage(channel.as_str()),
                            )
                            .await;
                        DeliveryResult::delivered(channel)
                    }
                    Err(cause) => {
                        self.handle_delivery_failure(job, channel, cause, notification_id, correlation_id)
                            .await
                    }
                }
            }
        });

        join_all(attempts).await
    }

    /// Wrap a channel failure, audit it, and hand back a failed result.
    ///
    /// Retryable while the job has attempts left.
    pub async fn handle_delivery_failure(
        &self,
        job: &Job,
        channel: Channel,
        cause: ChannelFailure,
        notification_id: Option<NotificationId>,
        correlation_id: CorrelationId,
    ) -> DeliveryResult {
        let retryable = job.has_attempts_left();
        let error = DeliveryError::new(channel, retryable, cause.to_string());

        warn!(
            job_id = %job.id,
            correlation_id = %correlation_id,
            channel = channel.as_str(),
            attempt = job.attempts,
            retryable,
            error = %error,
            "channel delivery failed"
        );

        let status = if retryable {
            AuditStatus::Retrying
        } else {
            AuditStatus::Failed
        };
        self.audit
            .record(
                AuditEntry::new(events::NOTIFICATION_FAILED, status)
                    .job(job.id)
                    .correlation(correlation_id)
                    .retries(job.attempts)
                    .notification(notification_id)
                    .user(job.payload.user_id)
                    .stage(channel.as_str())
                    .error(error.to_string()),
            )
            .await;

        DeliveryResult::failed(error)
    }
}

impl core::fmt::Debug for DeliveryCoordinator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut channels: Vec<&str> = self.channels.keys().map(|c| c.as_str()).collect();
        channels.sort_unstable();
        f.debug_struct("DeliveryCoordinator")
            .field("channels", &channels)
            .finish_non_exhaustive()
    }
}
