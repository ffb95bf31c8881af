//! # Chime Core Service System Errors
//!
//! Defines error types for service registration, discovery, and invocation.
//! Unknown-service and unknown-method failures are distinct variants so a
//! caller can tell which lookup failed.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid service interface '{name}': {reason}")]
    InvalidInterface { name: String, reason: String },

    #[error("Service name already registered: {0}")]
    DuplicateService(String),

    #[error("Service not found: {0}")]
    UnknownService(String),

    #[error("Service '{service}' has no method '{method}'")]
    UnknownMethod { service: String, method: String },

    #[error("Method '{method}' missing required argument '{parameter}'")]
    MissingArgument { method: String, parameter: String },

    #[error("Method '{method}' received unexpected argument '{parameter}'")]
    UnexpectedArgument { method: String, parameter: String },

    #[error("Service hook failed for '{service}': {message}")]
    HookFailed { service: String, message: String },

    #[error("Service method '{service}.{method}' failed: {message}")]
    ExecutionFailed {
        service: String,
        method: String,
        message: String,
    },

    #[error("Internal service error: {0}")]
    InternalError(String),
}
