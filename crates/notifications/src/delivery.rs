//! Per-channel delivery outcomes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::preference::Channel;

/// Structured failure of one channel attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{channel} delivery failed: {cause}")]
pub struct DeliveryError {
    pub channel: Channel,
    /// True while the job has attempts left.
    pub retryable: bool,
    pub cause: String,
}

impl DeliveryError {
    pub fn new(channel: Channel, retryable: bool, cause: impl Into<String>) -> Self {
        Self {
            channel,
            retryable,
            cause: cause.into(),
        }
    }
}

/// Outcome of one delivery attempt on one channel. Not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryResult {
    pub channel: Channel,
    pub success: bool,
    pub error: Option<DeliveryError>,
    pub timestamp: DateTime<Utc>,
}

impl DeliveryResult {
    pub fn delivered(channel: Channel) -> Self {
        Self {
            channel,
            success: true,
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(error: DeliveryError) -> Self {
        Self {
            channel: error.channel,
            success: false,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    pub fn is_retryable_failure(&self) -> bool {
        self.error.as_ref().is_some_and(|e| e.retryable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_result_carries_channel_of_error() {
        let result = DeliveryResult::failed(DeliveryError::new(Channel::Email, true, "connection reset"));

        assert_eq!(result.channel, Channel::Email);
        assert!(!result.success);
        assert!(result.is_retryable_failure());
        assert_eq!(
            result.error.unwrap().to_string(),
            "email delivery failed: connection reset"
        );
    }

    #[test]
    fn delivered_result_is_not_a_failure() {
        assert!(!DeliveryResult::delivered(Channel::InApp).is_retryable_failure());
    }
}
