//! Deposit Gateway
//!
//! The backend calls the deposit workflow depends on, behind a trait so the
//! workflow can run against the REST client or a test double.

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use super::types::{
    string_or_number, Account, ConfirmDepositRequest, Envelope, InitiateDepositRequest,
    IntentStatus, PaymentIntent,
};
use crate::http::{ApiClient, HttpError};

pub const ACCOUNTS_PATH: &str = "/api/accounts";
pub const INITIATE_DEPOSIT_PATH: &str = "/api/payments/deposits/initiate";
pub const CONFIRM_DEPOSIT_PATH: &str = "/api/payments/deposits/confirm";

/// Status endpoint of one transaction, with the id as a single
/// percent-encoded path segment
pub fn transaction_status_path(intent_id: &str) -> Result<String, ApiError> {
    let mut url = Url::parse("http://localhost").map_err(|e| ApiError::Malformed(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::Malformed("status URL cannot take a path".to_string()))?
        .pop_if_empty()
        .extend(["api", "payments", "transactions", intent_id, "status"]);
    Ok(url.path().to_string())
}

/// Backend API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Http(#[from] HttpError),

    /// The backend answered but refused the operation
    #[error("{0}")]
    Rejected(String),

    /// The backend answered with an unexpected shape
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl ApiError {
    /// Message to show the user: the backend's own message when it sent
    /// one, otherwise `default`.
    pub fn user_message(&self, default: &str) -> String {
        match self {
            ApiError::Rejected(message) if !message.trim().is_empty() => message.clone(),
            ApiError::Http(HttpError::Status { body, .. }) => {
                extract_error_message(body).unwrap_or_else(|| default.to_string())
            }
            ApiError::Http(HttpError::Unauthorized) => {
                "Session expired. Please log in again.".to_string()
            }
            _ => default.to_string(),
        }
    }
}

/// Pull `message` (or `error`) out of a JSON error body
pub fn extract_error_message(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let candidates = [
        value.get("message"),
        value.get("error").and_then(|e| e.get("message")),
        value.get("error"),
    ];
    let found = candidates
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string);
    found
}

/// Backend operations used by the deposit workflow
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DepositGateway: Send + Sync {
    /// Accounts the user can deposit into
    async fn list_accounts(&self) -> Result<Vec<Account>, ApiError>;

    /// Start a deposit and return the new payment intent
    async fn initiate_deposit(
        &self,
        request: &InitiateDepositRequest,
    ) -> Result<PaymentIntent, ApiError>;

    /// Current status of a payment intent
    async fn transaction_status(&self, intent_id: &str) -> Result<IntentStatus, ApiError>;

    /// Tell the backend the user completed the out-of-band step
    async fn confirm_deposit(&self, intent_id: &str) -> Result<(), ApiError>;
}

#[derive(Debug, Deserialize)]
struct InitiatedIntent {
    #[serde(alias = "_id", deserialize_with = "string_or_number")]
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusData {
    status: IntentStatus,
}

#[async_trait]
impl DepositGateway for ApiClient {
    async fn list_accounts(&self) -> Result<Vec<Account>, ApiError> {
        let value: serde_json::Value = self.get_json(ACCOUNTS_PATH).await?;
        let list = match value {
            serde_json::Value::Array(_) => value,
            serde_json::Value::Object(mut map) => map
                .remove("data")
                .or_else(|| map.remove("accounts"))
                .ok_or_else(|| ApiError::Malformed("accounts list missing".to_string()))?,
            _ => return Err(ApiError::Malformed("accounts list missing".to_string())),
        };
        serde_json::from_value(list).map_err(|e| ApiError::Malformed(e.to_string()))
    }

    async fn initiate_deposit(
        &self,
        request: &InitiateDepositRequest,
    ) -> Result<PaymentIntent, ApiError> {
        let envelope: Envelope<serde_json::Value> =
            self.post_json(INITIATE_DEPOSIT_PATH, request).await?;

        if envelope.success == Some(false) {
            return Err(ApiError::Rejected(envelope.message.unwrap_or_default()));
        }

        let data = envelope
            .data
            .ok_or_else(|| ApiError::Malformed("missing data".to_string()))?;
        let intent: InitiatedIntent =
            serde_json::from_value(data).map_err(|e| ApiError::Malformed(e.to_string()))?;
        if intent.id.trim().is_empty() {
            return Err(ApiError::Malformed("empty intent id".to_string()));
        }

        Ok(PaymentIntent::pending(intent.id))
    }

    async fn transaction_status(&self, intent_id: &str) -> Result<IntentStatus, ApiError> {
        let envelope: Envelope<StatusData> =
            self.get_json(&transaction_status_path(intent_id)?).await?;
        envelope
            .data
            .map(|d| d.status)
            .ok_or_else(|| ApiError::Malformed("missing status".to_string()))
    }

    async fn confirm_deposit(&self, intent_id: &str) -> Result<(), ApiError> {
        self.post(CONFIRM_DEPOSIT_PATH, &ConfirmDepositRequest { id: intent_id })
            .await?;
        Ok(())
    }
}
