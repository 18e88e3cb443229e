//! Error types for the deployer

use thiserror::Error;

/// Main error type for the deployer
#[derive(Error, Debug)]
pub enum DeployerError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Container runtime error: {0}")]
    ContainerRuntimeError(String),

    #[error("Secret store error: {0}")]
    SecretStoreError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployerError {
    /// Caller misuse, as opposed to an operational failure
    pub fn is_validation(&self) -> bool {
        matches!(self, DeployerError::ValidationError(_))
    }
}

