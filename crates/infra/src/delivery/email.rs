//! Email channel over a pluggable mail transport.

use std::sync::Arc;

use async_trait::async_trait;
use talentbridge_core::UserId;
use talentbridge_notifications::Channel;
use tracing::info;

use super::{ChannelFailure, DeliveryChannel, DeliveryContext};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to: UserId,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
#[error("mail transport error: {0}")]
pub struct MailError(pub String);

/// Hands a rendered message to an outbound mail system.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError>;
}

/// Default transport: records the message in the log and reports success.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailTransport;

#[async_trait]
impl MailTransport for LogMailTransport {
    async fn send(&self, message: &MailMessage) -> Result<(), MailError> {
        info!(to = %message.to, subject = %message.subject, "email handed to log transport");
        Ok(())
    }
}

#[derive(Clone)]
pub struct EmailChannel {
    transport: Arc<dyn MailTransport>,
}

impl EmailChannel {
    pub fn new(transport: Arc<dyn MailTransport>) -> Self {
        Self { transport }
    }
}

impl Default for EmailChannel {
    fn default() -> Self {
        Self::new(Arc::new(LogMailTransport))
    }
}

#[async_trait]
impl DeliveryChannel for EmailChannel {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn deliver(&self, ctx: &DeliveryContext) -> Result<(), ChannelFailure> {
        let message = MailMessage {
            to: ctx.recipient,
            subject: ctx.kind.as_str().replace('_', " "),
            body: ctx.content.clone(),
        };
        self.transport
            .send(&message)
            .await
            .map_err(|e| ChannelFailure::Transport(e.0))
    }
}
