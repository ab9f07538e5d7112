//! Environment-based Configuration for the Vault5 client
//!
//! Values are read from environment variables (a `.env` file is honoured by
//! the binary). Everything except the production origin has a default.
//!
//! # Environment Variables
//!
//! ## API Endpoint
//! - `VAULT5_ENV` - "development" or "production" (default: "development")
//! - `VAULT5_API_URL` - Explicit API base URL, wins over everything else
//! - `VAULT5_PUBLIC_ORIGIN` - Origin serving the API in production
//!
//! ## HTTP Behaviour
//! - `VAULT5_HTTP_TIMEOUT_SECS` - Per-request timeout (default: 10)
//! - `VAULT5_MAX_RETRIES` - Retries for network/5xx failures (default: 3)
//! - `VAULT5_RETRY_BASE_MS` - First backoff delay, doubled per retry (default: 1000)
//!
//! ## Deposit Workflow
//! - `VAULT5_POLL_INTERVAL_MS` - Status poll interval (default: 3000)
//! - `VAULT5_SETTLE_DELAY_MS` - Wait after a successful status (default: 1000)
//! - `VAULT5_MANUAL_CHECK_DELAY_MS` - Wait before the manual follow-up check (default: 1200)
//! - `VAULT5_MAX_POLL_FAILURES` - Consecutive poll failures tolerated, 0 = unlimited (default: 10)
//! - `VAULT5_CURRENCY` - Deposit currency (default: "KES")
//!
//! ## Local State
//! - `VAULT5_STORE_PATH` - SQLite file holding token and device id
//! - `VAULT5_LOG_LEVEL` - Logging level (debug, info, warn, error)

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::deposit::WorkflowConfig;
use crate::http::{ClientConfig, RetryPolicy};

/// Base URL used outside production when nothing else is configured
pub const LOCAL_API_URL: &str = "http://localhost:5000";

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" | "local" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(
                "VAULT5_ENV".to_string(),
                format!("unknown environment: {}", s),
            )),
        }
    }
}

/// Main configuration struct
#[derive(Debug, Clone)]
pub struct Vault5Config {
    /// Deployment environment
    pub environment: Environment,

    /// Resolved API base URL (no trailing slash)
    pub api_url: String,

    /// Per-request timeout
    pub http_timeout: Duration,

    /// Maximum retries for network/5xx failures
    pub max_retries: u32,

    /// First backoff delay
    pub retry_base_delay: Duration,

    /// Status poll interval
    pub poll_interval: Duration,

    /// Delay between a success status and the success state
    pub settle_delay: Duration,

    /// Delay before the status check that follows a manual confirmation
    pub manual_check_delay: Duration,

    /// Consecutive poll failures tolerated before giving up (None = unlimited)
    pub max_poll_failures: Option<u32>,

    /// Deposit currency
    pub currency: String,

    /// SQLite store location
    pub store_path: PathBuf,

    /// Log level
    pub log_level: String,
}

impl Vault5Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment: Environment = lookup("VAULT5_ENV")
            .unwrap_or_else(|| "development".to_string())
            .parse()?;

        let api_url = resolve_api_url(
            lookup("VAULT5_API_URL").as_deref(),
            environment,
            lookup("VAULT5_PUBLIC_ORIGIN").as_deref(),
        )?;

        let http_timeout =
            Duration::from_secs(parse_or("VAULT5_HTTP_TIMEOUT_SECS", &lookup, 10u64)?);
        let max_retries = parse_or("VAULT5_MAX_RETRIES", &lookup, 3u32)?;
        let retry_base_delay =
            Duration::from_millis(parse_or("VAULT5_RETRY_BASE_MS", &lookup, 1000u64)?);

        let poll_interval =
            Duration::from_millis(parse_or("VAULT5_POLL_INTERVAL_MS", &lookup, 3000u64)?);
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue(
                "VAULT5_POLL_INTERVAL_MS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }
        let settle_delay =
            Duration::from_millis(parse_or("VAULT5_SETTLE_DELAY_MS", &lookup, 1000u64)?);
        let manual_check_delay =
            Duration::from_millis(parse_or("VAULT5_MANUAL_CHECK_DELAY_MS", &lookup, 1200u64)?);
        let max_poll_failures = match parse_or("VAULT5_MAX_POLL_FAILURES", &lookup, 10u32)? {
            0 => None,
            n => Some(n),
        };

        let currency = lookup("VAULT5_CURRENCY")
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| "KES".to_string());

        let store_path = lookup("VAULT5_STORE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(default_store_path);

        let log_level = lookup("VAULT5_LOG_LEVEL").unwrap_or_else(|| "info".to_string());

        Ok(Self {
            environment,
            api_url,
            http_timeout,
            max_retries,
            retry_base_delay,
            poll_interval,
            settle_delay,
            manual_check_delay,
            max_poll_failures,
            currency,
            store_path,
            log_level,
        })
    }

    /// HTTP client settings
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_url.clone(),
            timeout: self.http_timeout,
            retry: RetryPolicy {
                max_retries: self.max_retries,
                base_delay: self.retry_base_delay,
            },
        }
    }

    /// Deposit workflow settings
    pub fn workflow_config(&self) -> WorkflowConfig {
        WorkflowConfig {
            poll_interval: self.poll_interval,
            settle_delay: self.settle_delay,
            manual_check_delay: self.manual_check_delay,
            max_poll_failures: self.max_poll_failures,
            currency: self.currency.clone(),
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("=== Vault5 Configuration ===");
        println!("Environment: {:?}", self.environment);
        println!("API URL: {}", self.api_url);
        println!("HTTP Timeout: {:?}", self.http_timeout);
        println!(
            "Retries: {} (base delay {:?})",
            self.max_retries, self.retry_base_delay
        );
        println!("Poll Interval: {:?}", self.poll_interval);
        println!("Currency: {}", self.currency);
        println!("Store: {}", self.store_path.display());
        println!("Log Level: {}", self.log_level);
        println!("============================");
    }
}

/// Resolve the API base URL: explicit override, else the public origin in
/// production, else the local development server.
pub fn resolve_api_url(
    explicit: Option<&str>,
    environment: Environment,
    public_origin: Option<&str>,
) -> Result<String, ConfigError> {
    let chosen = match (explicit, environment) {
        (Some(url), _) if !url.trim().is_empty() => url.trim(),
        (_, Environment::Production) => public_origin
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("VAULT5_PUBLIC_ORIGIN".to_string()))?,
        (_, Environment::Development) => LOCAL_API_URL,
    };

    if !(chosen.starts_with("http://") || chosen.starts_with("https://")) {
        return Err(ConfigError::InvalidValue(
            "VAULT5_API_URL".to_string(),
            format!("not an http(s) URL: {}", chosen),
        ));
    }

    Ok(chosen.trim_end_matches('/').to_string())
}

fn parse_or<T, F>(var_name: &str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var_name) {
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::InvalidValue(var_name.to_string(), format!("not a number: {}", raw))
        }),
        None => Ok(default),
    }
}

fn default_store_path() -> PathBuf {
    env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".vault5")
        .join("session.db")
}
