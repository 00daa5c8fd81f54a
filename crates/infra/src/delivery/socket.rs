//! Realtime push to live sessions.
//!
//! Best effort: a recipient with no live session is a successful no-op.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use talentbridge_core::{JobId, NotificationId, UserId};
use talentbridge_notifications::{Channel, NotificationType};
use tokio::sync::broadcast;
use tracing::debug;

use super::{ChannelFailure, DeliveryChannel, DeliveryContext};

const SESSION_BUFFER: usize = 64;

/// Frame pushed to a connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeMessage {
    pub notification_id: Option<NotificationId>,
    pub job_id: JobId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub content: String,
}

/// Live sessions keyed by user; each user has one broadcast fan-out.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<UserId, broadcast::Sender<RealtimeMessage>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `user_id`. Dropping the receiver closes it.
    ///
    /// Users whose every session has closed are forgotten here.
    pub fn subscribe(&self, user_id: UserId) -> Result<broadcast::Receiver<RealtimeMessage>, ChannelFailure> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| ChannelFailure::Storage("session registry poisoned".into()))?;
        sessions.retain(|_, tx| tx.receiver_count() > 0);
        let sender = sessions
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(SESSION_BUFFER).0);
        Ok(sender.subscribe())
    }

    /// Push to every live session of `user_id`. Returns how many received it.
    pub fn push(&self, user_id: UserId, message: RealtimeMessage) -> Result<usize, ChannelFailure> {
        let sent = {
            let sessions = self
                .sessions
                .read()
                .map_err(|_| ChannelFailure::Storage("session registry poisoned".into()))?;
            match sessions.get(&user_id) {
                None => return Ok(0),
                Some(sender) => sender.send(message),
            }
        };
        if let Ok(receivers) = sent {
            return Ok(receivers);
        }

        // Every receiver is gone. A session may have reopened since the read.
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| ChannelFailure::Storage("session registry poisoned".into()))?;
        if sessions.get(&user_id).is_some_and(|tx| tx.receiver_count() == 0) {
            sessions.remove(&user_id);
        }
        Ok(0)
    }

    pub fn is_online(&self, user_id: UserId) -> bool {
        self.sessions
            .read()
            .map(|s| s.get(&user_id).is_some_and(|tx| tx.receiver_count() > 0))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct SocketChannel {
    registry: Arc<SessionRegistry>,
}

impl SocketChannel {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self { registry }
    }
}

#[async_trait]
impl DeliveryChannel for SocketChannel {
    fn channel(&self) -> Channel {
        Channel::Socket
    }

    async fn deliver(&self, ctx: &DeliveryContext) -> Result<(), ChannelFailure> {
        let message = RealtimeMessage {
            notification_id: ctx.notification_id,
            job_id: ctx.job_id,
            kind: ctx.kind.clone(),
            content: ctx.content.clone(),
        };
        let receivers = self.registry.push(ctx.recipient, message)?;
        debug!(job_id = %ctx.job_id, recipient = %ctx.recipient, receivers, "realtime push");
        Ok(())
    }
}
