//! Payments API Types
//!
//! Request and response shapes of the Vault5 payments endpoints.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Deposit channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Safaricom M-Pesa (STK push)
    Mpesa,
    /// Airtel Money
    Airtel,
    /// Manual bank transfer
    Bank,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Mpesa, Provider::Airtel, Provider::Bank];

    /// Mobile-money providers push a prompt to a phone number
    pub fn requires_phone(&self) -> bool {
        matches!(self, Provider::Mpesa | Provider::Airtel)
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Provider::Mpesa => "M-Pesa",
            Provider::Airtel => "Airtel Money",
            Provider::Bank => "Bank",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Mpesa => write!(f, "mpesa"),
            Provider::Airtel => write!(f, "airtel"),
            Provider::Bank => write!(f, "bank"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mpesa" | "m-pesa" => Ok(Provider::Mpesa),
            "airtel" => Ok(Provider::Airtel),
            "bank" => Ok(Provider::Bank),
            other => Err(format!("unknown provider: {}", other)),
        }
    }
}

/// Server-owned status of a payment intent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Success,
    Failed,
    #[serde(alias = "cancelled")]
    Canceled,
    Expired,
    /// Any status this client does not know; treated as still in progress
    #[serde(other)]
    Unknown,
}

impl IntentStatus {
    /// No further transitions are expected
    pub fn is_terminal(&self) -> bool {
        !matches!(self, IntentStatus::Pending | IntentStatus::Unknown)
    }

    /// Terminal and unsuccessful
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            IntentStatus::Failed | IntentStatus::Canceled | IntentStatus::Expired
        )
    }
}

impl std::fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentStatus::Pending => write!(f, "pending"),
            IntentStatus::Success => write!(f, "success"),
            IntentStatus::Failed => write!(f, "failed"),
            IntentStatus::Canceled => write!(f, "canceled"),
            IntentStatus::Expired => write!(f, "expired"),
            IntentStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// A payment intent as seen by the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Opaque id assigned by the backend
    pub id: String,
    /// Last observed status
    pub status: IntentStatus,
}

impl PaymentIntent {
    /// Freshly initiated intent
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: IntentStatus::Pending,
        }
    }
}

/// POST /api/payments/deposits/initiate
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateDepositRequest {
    pub provider: Provider,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub currency: String,
    /// "wallet" or an account id
    pub target_account: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// POST /api/payments/deposits/confirm
#[derive(Debug, Clone, Serialize)]
pub struct ConfirmDepositRequest<'a> {
    pub id: &'a str,
}

/// Account the user can deposit into (GET /api/accounts)
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(alias = "_id", deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default, alias = "accountName", alias = "goalName")]
    pub name: Option<String>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub balance: Option<Decimal>,
}

impl Account {
    /// Name to show in a picker
    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| format!("Account {}", self.id))
    }
}

/// Response envelope used by most endpoints: `{success, message, data}`
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub message: Option<String>,
    pub data: Option<T>,
}

/// Ids arrive as strings or numbers depending on the backend model
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}
