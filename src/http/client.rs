//! Vault5 REST Client
//!
//! Thin wrapper over `reqwest` that every backend call goes through:
//! - `Authorization: Bearer <token>` from the session, when present
//! - `X-Device-Id: <id>` on every request
//! - 401 clears the session and publishes `AuthEvent::LoginRequired`
//! - network failures and 5xx responses are retried with exponential backoff

use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

use super::retry::RetryPolicy;
use crate::common::{generate_correlation_id, log_api_request, log_api_response, LOCAL_API_URL};
use crate::session::Session;

/// Header carrying the device id
pub const DEVICE_ID_HEADER: &str = "X-Device-Id";

/// HTTP client errors
#[derive(Debug, Error)]
pub enum HttpError {
    /// Connection failure or timeout
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The backend rejected the credentials (session already cleared)
    #[error("unauthorized: please log in again")]
    Unauthorized,

    /// Any other non-success status, body passed through untouched
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The response body was not what the caller expected
    #[error("invalid response: {0}")]
    Decode(String),
}

impl HttpError {
    /// Network failures and server errors are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            HttpError::Network(_) => true,
            HttpError::Status { status, .. } => *status >= 500,
            HttpError::Unauthorized | HttpError::Decode(_) => false,
        }
    }

    /// Status code, when the failure carried one
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Unauthorized => Some(401),
            HttpError::Status { status, .. } => Some(*status),
            HttpError::Network(_) | HttpError::Decode(_) => None,
        }
    }

    /// Response body of a status error
    pub fn body(&self) -> Option<&str> {
        match self {
            HttpError::Status { body, .. } => Some(body),
            _ => None,
        }
    }
}

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL, without trailing slash
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retry policy for network/5xx failures
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: LOCAL_API_URL.to_string(),
            timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Default settings against a custom base URL
    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            ..Self::default()
        }
    }
}

/// Successful (2xx) response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    /// Decode the body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_str(&self.body).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

/// Authenticated REST client
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    config: ClientConfig,
    session: Session,
}

impl ApiClient {
    /// Create a client bound to a session
    pub fn new(config: ClientConfig, session: Session) -> Result<Self, HttpError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            config: ClientConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
            session,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    /// Session this client authenticates with
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// GET `path` and decode the JSON body
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, HttpError> {
        self.send(Method::GET, path, None).await?.json()
    }

    /// POST a JSON body to `path` and decode the JSON response
    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T, HttpError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let body = serde_json::to_value(body).map_err(|e| HttpError::Decode(e.to_string()))?;
        self.send(Method::POST, path, Some(&body)).await?.json()
    }

    /// POST a JSON body to `path`, keeping the raw response
    pub async fn post<B>(&self, path: &str, body: &B) -> Result<ApiResponse, HttpError>
    where
        B: Serialize + ?Sized,
    {
        let body = serde_json::to_value(body).map_err(|e| HttpError::Decode(e.to_string()))?;
        self.send(Method::POST, path, Some(&body)).await
    }

    /// Send a request, applying auth headers and the retry policy.
    ///
    /// The retry counter lives in this loop, so a retried request is never
    /// itself retried again beyond `max_retries`.
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, HttpError> {
        let url = format!("{}{}", self.config.base_url, path);
        let correlation_id = generate_correlation_id();
        let mut retries = 0u32;

        loop {
            log_api_request(method.as_str(), path, retries, &correlation_id);
            let started = Instant::now();

            let error = match self.execute_once(method.clone(), &url, body).await {
                Ok(response) => {
                    log_api_response(
                        method.as_str(),
                        path,
                        response.status,
                        started.elapsed().as_millis() as u64,
                        &correlation_id,
                    );
                    return Ok(response);
                }
                Err(error) => error,
            };

            log_api_response(
                method.as_str(),
                path,
                error.status().unwrap_or(0),
                started.elapsed().as_millis() as u64,
                &correlation_id,
            );

            if matches!(error, HttpError::Unauthorized) {
                self.session.expire();
                return Err(error);
            }

            if !self.config.retry.should_retry(&error, retries) {
                return Err(error);
            }

            retries += 1;
            let delay = self.config.retry.delay_for(retries);
            warn!(
                target: "vault5::api",
                correlation_id = %correlation_id,
                retry = retries,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "retrying request"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn execute_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<ApiResponse, HttpError> {
        let mut request = self
            .client
            .request(method, url)
            .header(DEVICE_ID_HEADER, self.session.device_id());

        if let Some(token) = self.session.token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let resp = request.send().await?;
        let status = resp.status().as_u16();
        let body = resp.text().await?;

        match status {
            200..=299 => Ok(ApiResponse { status, body }),
            401 => Err(HttpError::Unauthorized),
            _ => Err(HttpError::Status { status, body }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_urls() {
        let client = ApiClient::new(
            ClientConfig::with_base_url("http://localhost:5000/"),
            Session::in_memory(),
        )
        .unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000");

        let default = ClientConfig::default();
        assert_eq!(default.base_url, LOCAL_API_URL);
        assert_eq!(default.timeout, Duration::from_secs(10));
        assert_eq!(default.retry.max_retries, 3);
    }

    #[test]
    fn test_error_classification() {
        let server = HttpError::Status {
            status: 502,
            body: "bad gateway".into(),
        };
        assert!(server.is_retryable());
        assert_eq!(server.status(), Some(502));
        assert_eq!(server.body(), Some("bad gateway"));

        let conflict = HttpError::Status {
            status: 409,
            body: String::new(),
        };
        assert!(!conflict.is_retryable());
        assert_eq!(HttpError::Unauthorized.status(), Some(401));
        assert!(!HttpError::Decode("eof".into()).is_retryable());
    }

    #[test]
    fn test_response_json() {
        let resp = ApiResponse {
            status: 200,
            body: r#"{"data":{"status":"pending"}}"#.to_string(),
        };
        let value: serde_json::Value = resp.json().unwrap();
        assert_eq!(value["data"]["status"], "pending");

        let garbage = ApiResponse {
            status: 200,
            body: "<html>".to_string(),
        };
        assert!(matches!(
            garbage.json::<serde_json::Value>(),
            Err(HttpError::Decode(_))
        ));
    }
}
