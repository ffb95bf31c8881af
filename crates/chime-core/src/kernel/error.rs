//! # Chime Core Kernel Errors
//!
//! Defines the top-level [`Error`] enum aggregating the typed errors of each
//! subsystem (plugin system, service registry, message bus, communication
//! bus, storage) plus a generic catch-all, and the crate-wide `Result` alias.
use std::result::Result as StdResult;

use crate::event::error::EventSystemError;
use crate::messaging::error::MessagingError;
use crate::plugin_system::error::PluginSystemError;
use crate::services::error::ServiceError;
use crate::storage::error::StorageError;
use thiserror::Error as ThisError;

/// Top-level error type for the Chime plugin engine
#[derive(Debug, ThisError)]
pub enum Error {
    /// Typed plugin system error
    #[error("Plugin system error: {0}")]
    PluginSystem(#[from] PluginSystemError),

    /// Typed service registry error
    #[error("Service registry error: {0}")]
    Services(#[from] ServiceError),

    /// Typed message bus error
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),

    /// Typed communication bus error
    #[error("Event system error: {0}")]
    EventSystem(#[from] EventSystemError),

    /// Typed configuration storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Error occurring during a component lifecycle transition
    #[error("Lifecycle error in component '{component}' during {phase}: {message}")]
    Lifecycle {
        component: &'static str,
        phase: LifecyclePhase,
        message: String,
    },

    /// Generic error with message
    #[error("Error: {0}")]
    Other(String),
}

/// Represents a phase in a component's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ThisError)]
pub enum LifecyclePhase {
    #[error("Initialize")]
    Initialize,
    #[error("Start")]
    Start,
    #[error("Stop")]
    Stop,
}

/// Shorthand for Result with our Error type
pub type Result<T> = StdResult<T, Error>;

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}
