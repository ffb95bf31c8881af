//! # Chime Core Event System
//!
//! The typed-event layer plugins use for loosely-coupled notifications,
//! built atop the message bus and the service registry. Events carry a
//! [`EventType`](types::EventType) from the host domain (plugin lifecycle,
//! service lifecycle, schedule updates, theme changes, ...) and are delivered
//! to matching subscriptions; when a message bus is attached each event is
//! also mirrored as a `event.<type>` message for consumers that only speak
//! the lower layer.
pub mod bus;
pub mod error;
pub mod types;

pub use bus::{sync_event_callback, CommunicationBus, SubscriptionId};
pub use error::EventSystemError;
pub use types::{CommunicationEvent, EventType};

// Test module declaration
#[cfg(test)]
mod tests;
