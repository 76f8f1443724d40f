//! Error types for request resolution.

use thiserror::Error;

use crate::validator::ValidationErrors;

/// Result type alias for context operations.
pub type ContextResult<T> = Result<T, ContextError>;

/// Errors that can occur while loading or resolving a provisioning request.
#[derive(Error, Debug)]
pub enum ContextError {
    #[error("Request validation failed: {0}")]
    Validation(#[from] ValidationErrors),

    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("{engine} {version} version is not supported")]
    UnsupportedVersion { engine: String, version: String },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
