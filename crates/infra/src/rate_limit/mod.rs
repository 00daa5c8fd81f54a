//! Sliding-window admission control.
//!
//! - [`RateLimiter`]: per-sender admission for producers (admins bypass)
//! - [`ThroughputGate`]: pool-wide dequeue budget for the worker pool
//!
//! Both sit on a [`RateLimitStore`], which owns the atomic
//! check-and-record step so concurrent callers never double-spend budget.

mod in_memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use in_memory::InMemoryRateLimitStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisRateLimitStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use talentbridge_core::UserId;
use talentbridge_notifications::audit::{events, stages};
use talentbridge_notifications::{AuditEntry, AuditStatus};
use tracing::{debug, warn};

use crate::audit::AuditRecorder;

/// Counter store error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RateLimitError {
    #[error("rate limit store unavailable: {0}")]
    Unavailable(String),
    #[error("rate limit store error: {0}")]
    Command(String),
}

/// Shared sliding-window counters keyed by string.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Record a hit for `key` unless `max` hits already fall inside the
    /// trailing `window`. Returns whether the hit was recorded.
    async fn try_acquire(&self, key: &str, max: u32, window: Duration) -> Result<bool, RateLimitError>;

    /// Give back the most recent hit for `key`, for budget reserved by a
    /// caller that ended up with nothing to spend it on.
    async fn release(&self, key: &str) -> Result<(), RateLimitError>;
}

/// Admission decision for one producer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// Admin-originated; the counter was not touched.
    Bypass,
    Deny,
}

impl Decision {
    pub fn is_allowed(self) -> bool {
        !matches!(self, Self::Deny)
    }
}

/// Per-sender sliding-window limiter.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    audit: AuditRecorder,
    max: u32,
    window: Duration,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, audit: AuditRecorder, max: u32, window: Duration) -> Self {
        Self {
            store,
            audit,
            max,
            window,
        }
    }

    /// Admit or deny one enqueue by `sender`.
    ///
    /// A deny writes a `rate_limit_block` audit entry before returning.
    pub async fn admit(&self, sender: UserId, is_admin: bool) -> Result<Decision, RateLimitError> {
        if is_admin {
            debug!(sender_id = %sender, "admin enqueue bypasses rate limit");
            return Ok(Decision::Bypass);
        }

        let key = sender_key(sender);
        if self.store.try_acquire(&key, self.max, self.window).await? {
            return Ok(Decision::Allow);
        }

        warn!(sender_id = %sender, max = self.max, window_ms = self.window.as_millis() as u64, "rate limit exceeded");
        self.audit
            .record(
                AuditEntry::new(events::RATE_LIMIT_BLOCK, AuditStatus::Failed)
                    .user(sender)
                    .retries(0)
                    .stage(stages::ADMISSION)
                    .error(format!("Rate limit exceeded for sender {sender}")),
            )
            .await;

        Ok(Decision::Deny)
    }
}

impl core::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max", &self.max)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}

fn sender_key(sender: UserId) -> String {
    format!("notify:rate:sender:{sender}")
}

/// Pool-wide dequeue budget shared by every worker.
///
/// Workers [`reserve`](Self::reserve) a unit before claiming and
/// [`release`](Self::release) it when the queue had nothing to claim.
#[derive(Clone)]
pub struct ThroughputGate {
    store: Arc<dyn RateLimitStore>,
    key: String,
    max: u32,
    window: Duration,
}

impl ThroughputGate {
    pub fn new(store: Arc<dyn RateLimitStore>, queue_name: &str, max: u32, window: Duration) -> Self {
        Self {
            store,
            key: format!("notify:rate:throughput:{queue_name}"),
            max,
            window,
        }
    }

    /// Take one unit of budget, or `false` when the window is spent.
    pub async fn reserve(&self) -> Result<bool, RateLimitError> {
        self.store.try_acquire(&self.key, self.max, self.window).await
    }

    pub async fn release(&self) -> Result<(), RateLimitError> {
        self.store.release(&self.key).await
    }
}

impl core::fmt::Debug for ThroughputGate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ThroughputGate")
            .field("key", &self.key)
            .field("max", &self.max)
            .field("window", &self.window)
            .finish_non_exhaustive()
    }
}
