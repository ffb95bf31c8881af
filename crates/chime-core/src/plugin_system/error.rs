//! # Chime Core Plugin System Errors
//!
//! Defines error types specific to the plugin system: manifest loading and
//! parsing, registration, dependency validation, lifecycle transitions, and
//! factory resolution.
use std::path::PathBuf;

use crate::plugin_system::dependency::DependencyError;
use crate::plugin_system::version::VersionError;

#[derive(Debug, thiserror::Error)]
pub enum PluginSystemError {
    #[error("Plugin manifest error for '{path}': {message}")]
    ManifestError { path: PathBuf, message: String },

    #[error("Plugin manifest '{path}' is {size} bytes, above the {limit} byte limit")]
    ManifestTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("Plugin already registered: {0}")]
    DuplicatePlugin(String),

    #[error("Plugin not found: {0}")]
    PluginNotFound(String),

    #[error("No factory registered for entry point '{entry_point}' of plugin '{plugin_id}'")]
    FactoryNotFound {
        plugin_id: String,
        entry_point: String,
    },

    #[error("Dependency validation failed for '{plugin_id}': {details}")]
    ValidationFailed { plugin_id: String, details: String },

    #[error("Plugin initialization error for '{plugin_id}': {message}")]
    InitializationError { plugin_id: String, message: String },

    #[error("Plugin activation error for '{plugin_id}': {message}")]
    ActivationError { plugin_id: String, message: String },

    #[error("Plugin deactivation error for '{plugin_id}': {message}")]
    DeactivationError { plugin_id: String, message: String },

    #[error("Plugin cleanup error for '{plugin_id}': {message}")]
    CleanupError { plugin_id: String, message: String },

    #[error("Dependency resolution failed: {0}")]
    DependencyResolution(#[from] DependencyError),

    #[error("Version parsing error: {0}")]
    VersionParsing(#[from] VersionError),

    #[error("Internal plugin system error: {0}")]
    InternalError(String),
}
