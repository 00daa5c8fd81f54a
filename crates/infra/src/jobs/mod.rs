//! Priority job queue with delayed eligibility, retry, and backoff.
//!
//! ## Components
//!
//! - `JobStore`: persistence and atomic claim (in-memory or Postgres)
//! - `RetryScheduler`: owns backoff timing, attempt accounting, retention
//! - `WorkerPool`: bounded-concurrency workers driving the pipeline

pub mod postgres;
pub mod scheduler;
pub mod store;
pub mod worker_pool;

pub use postgres::PostgresJobStore;
pub use scheduler::{RetryScheduler, Settlement};
pub use store::{DEFAULT_LEASE, InMemoryJobStore, JobStore, QueueError};
pub use worker_pool::{WorkerPool, WorkerPoolConfig, WorkerPoolHandle};
