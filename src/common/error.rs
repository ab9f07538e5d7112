//! Common Error Types for the Vault5 client
//!
//! Provides unified error handling across all modules.

use thiserror::Error;

use crate::api::ApiError;
use crate::deposit::ValidationErrors;
use crate::http::HttpError;
use crate::storage::StorageError;

/// Root error type for the Vault5 client
#[derive(Debug, Error)]
pub enum Vault5Error {
    /// Configuration errors
    #[error("configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// Logging errors
    #[error("logging error: {0}")]
    Logging(#[from] super::logging::LoggingError),

    /// Session/device storage errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Transport-level errors
    #[error("http error: {0}")]
    Http(#[from] HttpError),

    /// Backend API errors
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// Form validation errors
    #[error("validation error: {0}")]
    Validation(#[from] ValidationErrors),

    /// Workflow misuse (operation not valid in the current state)
    #[error("workflow error: {0}")]
    Workflow(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Vault5Error {
    /// Create a workflow error
    pub fn workflow(msg: impl Into<String>) -> Self {
        Self::Workflow(msg.into())
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        match self {
            Vault5Error::Http(e) => e.is_retryable(),
            Vault5Error::Api(ApiError::Http(e)) => e.is_retryable(),
            Vault5Error::Storage(_) | Vault5Error::Io(_) => true,
            _ => false,
        }
    }

    /// Get error code for display and logs
    pub fn error_code(&self) -> &'static str {
        match self {
            Vault5Error::Config(_) => "CONFIG_ERROR",
            Vault5Error::Logging(_) => "LOGGING_ERROR",
            Vault5Error::Storage(_) => "STORAGE_ERROR",
            Vault5Error::Http(_) => "HTTP_ERROR",
            Vault5Error::Api(_) => "API_ERROR",
            Vault5Error::Validation(_) => "VALIDATION_ERROR",
            Vault5Error::Workflow(_) => "WORKFLOW_ERROR",
            Vault5Error::Io(_) => "IO_ERROR",
        }
    }
}

/// Result type alias using Vault5Error
pub type Result<T> = std::result::Result<T, Vault5Error>;
