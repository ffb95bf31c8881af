//! # Chime Core Event System Errors
//!
//! Defines error types specific to the communication bus.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventSystemError {
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    #[error("Callback failed for event '{event}': {reason}")]
    CallbackFailed { event: String, reason: String },

    #[error("Internal event system error: {0}")]
    InternalError(String),
}
