//! Redis sliding-window counters (sorted set per key).
//!
//! Check-and-record runs as one Lua script, so concurrent producers on any
//! node see a consistent count. Scores are Redis server time in ms.

use std::time::Duration;

use async_trait::async_trait;
use redis::Script;
use redis::aio::MultiplexedConnection;
use tracing::instrument;
use uuid::Uuid;

use super::{RateLimitError, RateLimitStore};

const ACQUIRE_SCRIPT: &str = r#"
local key = KEYS[1]
local window = tonumber(ARGV[1])
local max = tonumber(ARGV[2])
local member = ARGV[3]
local t = redis.call('TIME')
local now = tonumber(t[1]) * 1000 + math.floor(tonumber(t[2]) / 1000)
redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
if redis.call('ZCARD', key) >= max then
  return 0
end
redis.call('ZADD', key, now, member)
redis.call('PEXPIRE', key, window)
return 1
"#;

const RELEASE_SCRIPT: &str = r#"
redis.call('ZPOPMAX', KEYS[1])
return 1
"#;

#[derive(Clone)]
pub struct RedisRateLimitStore {
    conn: MultiplexedConnection,
    acquire: Script,
    release: Script,
}

impl RedisRateLimitStore {
    /// Connect to Redis (e.g. "redis://localhost:6379").
    pub async fn connect(redis_url: impl AsRef<str>) -> Result<Self, RateLimitError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RateLimitError::Unavailable(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RateLimitError::Unavailable(e.to_string()))?;

        Ok(Self {
            conn,
            acquire: Script::new(ACQUIRE_SCRIPT),
            release: Script::new(RELEASE_SCRIPT),
        })
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimitStore {
    #[instrument(skip(self), err)]
    async fn try_acquire(&self, key: &str, max: u32, window: Duration) -> Result<bool, RateLimitError> {
        let mut conn = self.conn.clone();
        let admitted: i64 = self
            .acquire
            .key(key)
            .arg(window.as_millis() as u64)
            .arg(max)
            .arg(Uuid::now_v7().to_string())
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Command(e.to_string()))?;

        Ok(admitted == 1)
    }

    #[instrument(skip(self), err)]
    async fn release(&self, key: &str) -> Result<(), RateLimitError> {
        let mut conn = self.conn.clone();
        let _: i64 = self
            .release
            .key(key)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Command(e.to_string()))?;

        Ok(())
    }
}

impl core::fmt::Debug for RedisRateLimitStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RedisRateLimitStore").finish_non_exhaustive()
    }
}
