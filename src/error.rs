// src/error.rs

//! Unified error handling for demand scaffolding.

use std::fmt;

use thiserror::Error;

/// Result type alias for scaffolding operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
///
/// Every variant aborts the whole scaffolding call. Nothing here is retried
/// internally; the invoking workflow owns retry policy.
#[derive(Error, Debug)]
pub enum AppError {
    /// Request is structurally valid but semantically unusable
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An external file-system or access-point lookup failed
    #[error("Failed to resolve {resource}: {message}")]
    Resolution { resource: String, message: String },

    /// Request payload (or any JSON document) could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// AWS S3 error
    #[error("S3 error: {0}")]
    S3(String),
}

impl AppError {
    /// Create an invalid-input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Create a resolution error for the named resource.
    pub fn resolution(resource: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Resolution {
            resource: resource.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// True for failures caused by the caller's request rather than the environment.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::Serialization(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_message_names_resource() {
        let err = AppError::resolution("access point fsap-123", "not found");
        assert_eq!(
            err.to_string(),
            "Failed to resolve access point fsap-123: not found"
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(AppError::invalid_input("scratch is empty").is_client_error());
        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert!(AppError::from(json_err).is_client_error());
        assert!(!AppError::config("bad").is_client_error());
        assert!(!AppError::resolution("fs-1", "denied").is_client_error());
    }
}
