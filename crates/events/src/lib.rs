//! Lifecycle event distribution.
//!
//! A small pub/sub abstraction used to side-channel worker lifecycle events
//! (claimed, completed, retrying, failed, error) to observers without letting
//! them influence job control flow.

pub mod bus;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
