//! # Chime Core Storage Errors
//!
//! Defines error types for the configuration storage boundary.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to serialize config value for key '{key}': {reason}")]
    Serialization { key: String, reason: String },

    #[error("Config store rejected write to key '{key}': {reason}")]
    WriteRejected { key: String, reason: String },

    #[error("Internal storage error: {0}")]
    InternalError(String),
}
