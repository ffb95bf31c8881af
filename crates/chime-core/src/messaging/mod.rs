//! # Chime Core Messaging
//!
//! The topic-based transport plugins use to exchange messages: pub/sub with
//! exact and trailing-wildcard topic patterns, priority levels, delivery
//! tracking for anything stronger than fire-and-forget, and a request/response
//! convenience built on correlation ids.
//!
//! Delivery is asynchronous: [`MessageBus::send_message`](bus::MessageBus::send_message)
//! enqueues and returns; a background worker drains the queue in FIFO order
//! and invokes matching handlers sorted by their priority filters.
pub mod bus;
pub mod error;
pub mod message;
pub mod tracker;

pub use bus::{sync_message_handler, HandlerId, MessageBus};
pub use error::MessagingError;
pub use message::{DeliveryMode, Message, MessagePriority, MessageType};
pub use tracker::{DeliveryOutcome, DeliveryTracker};

// Test module declaration
#[cfg(test)]
mod tests;
