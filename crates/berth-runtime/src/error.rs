//! Error types for runtime client operations.

use thiserror::Error;

/// Result type for runtime client operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Errors that can occur while driving a container runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// A container, network, or exec instance does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A name is already in use by another resource.
    #[error("already in use: {0}")]
    Conflict(String),

    /// The operation requires a running container that is not running.
    #[error("container not running: {0}")]
    NotRunning(String),

    /// The registry reports that the image reference does not exist.
    #[error("image not found: {0}")]
    ImageNotFound(String),

    /// The registry could not be reached or refused the request.
    #[error("registry error for {reference}: {reason}")]
    Registry {
        /// The image reference being pulled.
        reference: String,
        /// The reason for the failure.
        reason: String,
    },

    /// Docker API error.
    #[error("Docker API error: {0}")]
    Api(#[from] bollard::errors::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RuntimeError {
    /// Creates a not found error.
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Creates a conflict error.
    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    /// Creates a not running error.
    pub fn not_running(what: impl Into<String>) -> Self {
        Self::NotRunning(what.into())
    }

    /// Creates an image not found error.
    pub fn image_not_found(reference: impl Into<String>) -> Self {
        Self::ImageNotFound(reference.into())
    }

    /// Creates a registry error.
    pub fn registry(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Registry {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if the resource was missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::ImageNotFound(_))
    }

    /// Returns true if the failure was a name collision.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
