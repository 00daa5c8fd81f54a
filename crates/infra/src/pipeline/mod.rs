//! Per-job gating and orchestration run by the worker pool.

pub mod permission;
pub mod preferences;
pub mod processor;

pub use permission::{DenialReason, PermissionCheck, PermissionValidator};
pub use preferences::{PreferenceResolver, ResolvedPreferences};
pub use processor::{NotificationProcessor, ProcessReport, ProcessingError};
