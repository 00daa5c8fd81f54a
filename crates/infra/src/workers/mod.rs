//! Background observers.

pub mod lifecycle_observer;

pub use lifecycle_observer::{LifecycleObserver, ObserverHandle, log_worker_event};
