//! Configuration loading and representation.
//!
//! Every knob has a default matching the pipeline's documented behavior, so
//! an empty environment yields a working in-memory setup.

use std::str::FromStr;
use std::time::Duration;

use talentbridge_notifications::RetryPolicy;
use tracing::warn;

pub const DEFAULT_QUEUE_NAME: &str = "notifications";
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyConfig {
    /// Jobs processed concurrently by the worker pool.
    pub worker_concurrency: usize,
    /// Admissions per sender per `rate_limit_window`.
    pub rate_limit_max: u32,
    pub rate_limit_window: Duration,
    /// Dequeues per `throughput_window`, pool-wide.
    pub throughput_max: u32,
    pub throughput_window: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub poll_interval: Duration,
    /// How long a claimed job may stay active before another worker takes it back.
    pub job_lease: Duration,
    /// Keep completed jobs queryable instead of discarding them.
    pub retain_completed: bool,
    /// Also push to live sessions whenever in-app delivery is enabled.
    pub realtime_push: bool,
    pub queue_name: String,
    pub use_persistent_stores: bool,
    pub database_url: Option<String>,
    pub redis_url: String,
    pub bind_addr: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            worker_concurrency: 5,
            rate_limit_max: 100,
            rate_limit_window: Duration::from_secs(60),
            throughput_max: 100,
            throughput_window: Duration::from_secs(60),
            max_attempts: 3,
            backoff_base: Duration::from_millis(1000),
            poll_interval: Duration::from_millis(250),
            job_lease: crate::jobs::DEFAULT_LEASE,
            retain_completed: false,
            realtime_push: true,
            queue_name: DEFAULT_QUEUE_NAME.to_string(),
            use_persistent_stores: false,
            database_url: None,
            redis_url: DEFAULT_REDIS_URL.to_string(),
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
        }
    }
}

impl NotifyConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup (used by tests).
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Self {
            worker_concurrency: parse_or(&lookup, "NOTIFY_WORKER_CONCURRENCY", defaults.worker_concurrency)
                .max(1),
            rate_limit_max: parse_or(&lookup, "NOTIFY_RATE_LIMIT_MAX", defaults.rate_limit_max),
            rate_limit_window: millis_or(&lookup, "NOTIFY_RATE_LIMIT_WINDOW_MS", defaults.rate_limit_window),
            throughput_max: parse_or(&lookup, "NOTIFY_THROUGHPUT_MAX", defaults.throughput_max),
            throughput_window: millis_or(&lookup, "NOTIFY_THROUGHPUT_WINDOW_MS", defaults.throughput_window),
            max_attempts: parse_or(&lookup, "NOTIFY_MAX_ATTEMPTS", defaults.max_attempts).max(1),
            backoff_base: millis_or(&lookup, "NOTIFY_BACKOFF_BASE_MS", defaults.backoff_base),
            poll_interval: millis_or(&lookup, "NOTIFY_POLL_INTERVAL_MS", defaults.poll_interval),
            job_lease: millis_or(&lookup, "NOTIFY_JOB_LEASE_MS", defaults.job_lease),
            retain_completed: parse_or(&lookup, "NOTIFY_RETAIN_COMPLETED", defaults.retain_completed),
            realtime_push: parse_or(&lookup, "NOTIFY_REALTIME_PUSH", defaults.realtime_push),
            queue_name: lookup("NOTIFY_QUEUE_NAME").unwrap_or(defaults.queue_name),
            use_persistent_stores: parse_or(&lookup, "USE_PERSISTENT_STORES", defaults.use_persistent_stores),
            database_url: lookup("DATABASE_URL"),
            redis_url: lookup("REDIS_URL").unwrap_or(defaults.redis_url),
            bind_addr: lookup("BIND_ADDR").unwrap_or(defaults.bind_addr),
        }
    }

    /// Retry policy attached to every enqueued job.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.backoff_base,
            ..RetryPolicy::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + core::fmt::Debug,
{
    match lookup(key) {
        None => default,
        Some(raw) => match raw.trim().parse::<T>() {
            Ok(value) => value,
            Err(_) => {
                warn!(key, value = %raw, default = ?default, "unparseable config value, using default");
                default
            }
        },
    }
}

fn millis_or<F>(lookup: &F, key: &str, default: Duration) -> Duration
where
    F: Fn(&str) -> Option<String>,
{
    Duration::from_millis(parse_or(lookup, key, default.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> NotifyConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        NotifyConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        assert_eq!(config(&[]), NotifyConfig::default());
    }

    #[test]
    fn overrides_are_applied() {
        let cfg = config(&[
            ("NOTIFY_WORKER_CONCURRENCY", "8"),
            ("NOTIFY_RATE_LIMIT_WINDOW_MS", "1500"),
            ("NOTIFY_RETAIN_COMPLETED", "true"),
            ("NOTIFY_JOB_LEASE_MS", "90000"),
            ("USE_PERSISTENT_STORES", "true"),
            ("DATABASE_URL", "postgres://localhost/talentbridge"),
        ]);

        assert_eq!(cfg.worker_concurrency, 8);
        assert_eq!(cfg.rate_limit_window, Duration::from_millis(1500));
        assert!(cfg.retain_completed);
        assert_eq!(cfg.job_lease, Duration::from_secs(90));
        assert!(cfg.use_persistent_stores);
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/talentbridge"));
    }

    #[test]
    fn garbage_falls_back_to_default() {
        let cfg = config(&[("NOTIFY_MAX_ATTEMPTS", "three"), ("NOTIFY_WORKER_CONCURRENCY", "0")]);
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.worker_concurrency, 1);
    }

    #[test]
    fn retry_policy_follows_config() {
        let cfg = config(&[("NOTIFY_MAX_ATTEMPTS", "5"), ("NOTIFY_BACKOFF_BASE_MS", "200")]);
        let policy = cfg.retry_policy();
        assert_eq!(policy.max_attempts, 5);
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(800));
    }
}
