//! Common Infrastructure Module
//!
//! Shared utilities and configuration for the Vault5 client.
//!
//! This module contains:
//! - Configuration loading from environment variables
//! - Structured logging setup
//! - Common error types

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{resolve_api_url, ConfigError, Environment, Vault5Config, LOCAL_API_URL};
pub use error::{Result, Vault5Error};
pub use logging::{
    error_event, generate_correlation_id, init_from_config, init_logging, log_api_request,
    log_api_response, log_deposit_event, log_error, log_session_event, log_system_event,
    system_event, ErrorDetails, EventCategory, LogEvent, LogLevel, LoggingError,
};
