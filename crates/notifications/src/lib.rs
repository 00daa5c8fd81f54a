//! `talentbridge-notifications`: notification pipeline domain model.
//!
//! Pure types and policies (no IO):
//!
//! - `NotificationPayload`: fixed envelope (sender, recipient, owner, type,
//!   content) plus a typed extension map
//! - `Job` / `JobState` / `RetryPolicy`: queued work and its retry budget
//! - `Preference` and channel resolution
//! - `DeliveryResult` / `DeliveryError`: per-channel outcomes
//! - `AuditEntry`: append-only lifecycle facts
//! - `JobStatusView`: normalized read projection for status queries

pub mod audit;
pub mod delivery;
pub mod job;
pub mod lifecycle;
pub mod notification;
pub mod payload;
pub mod preference;
pub mod priority;
pub mod retry;
pub mod status;

pub use audit::{AuditEntry, AuditStatus};
pub use delivery::{DeliveryError, DeliveryResult};
pub use job::{Job, JobAttemptRecord, JobOutcome, JobState};
pub use lifecycle::WorkerEvent;
pub use notification::{NewNotification, Notification};
pub use payload::{NotificationPayload, NotificationType};
pub use preference::{Channel, Preference, resolve_channels};
pub use priority::Priority;
pub use retry::{BackoffStrategy, RetryPolicy};
pub use status::{JobStatusView, NormalizedState, StateCounts};
