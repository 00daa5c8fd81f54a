//! Infrastructure layer for the notification pipeline: stores, admission
//! control, workers, delivery channels, and the service facade.

pub mod audit;
pub mod config;
pub mod db;
pub mod delivery;
pub mod jobs;
pub mod pipeline;
pub mod rate_limit;
pub mod repositories;
pub mod service;
pub mod status;
pub mod workers;

pub use config::NotifyConfig;
pub use service::{Collaborators, EnqueueError, NotificationService};
