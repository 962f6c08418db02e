//! Event bus for scheduler lifecycle events.
//!
//! Subscribers (notification delivery, dashboards, tests) receive dispatch,
//! deferral, completion, and retention events without the scheduler waiting
//! on them.

/// Core event bus implementation (broadcast channel).
pub mod bus;
/// Event type definitions.
pub mod types;

pub use bus::{EventBus, NotificationReceiver};
pub use types::{DeferReason, NotificationIntent, SchedulerEvent};

#[cfg(test)]
mod tests;
