//! # Chime Core Messaging Errors
//!
//! Defines error types for message validation, enqueueing, and delivery.
use thiserror::Error;

use crate::messaging::message::MessageId;

#[derive(Debug, Error)]
pub enum MessagingError {
    #[error("Message {0} has an empty topic")]
    MissingTopic(MessageId),

    #[error("Message {0} has an empty sender")]
    MissingSender(MessageId),

    #[error("Message {0} is already expired")]
    Expired(MessageId),

    #[error("Message {0} was vetoed by a bus filter")]
    Vetoed(MessageId),

    #[error("Message bus is not running")]
    BusNotRunning,

    #[error("Handler not found: {0}")]
    HandlerNotFound(u64),

    #[error("Handler for topic '{topic}' failed: {message}")]
    HandlerFailed { topic: String, message: String },

    #[error("Internal messaging error: {0}")]
    InternalError(String),
}
