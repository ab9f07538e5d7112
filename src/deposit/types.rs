//! Deposit Workflow Types
//!
//! Form, state and configuration of the deposit workflow:
//! form → confirm → waiting → success | error

use serde::Serialize;
use std::time::Duration;

use crate::api::{Account, IntentStatus, PaymentIntent, Provider};

/// Target value meaning "the main wallet"
pub const WALLET_TARGET: &str = "wallet";

/// Step of the deposit workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Collecting amount, provider, target and phone
    Form,
    /// Read-only summary before initiating
    Confirm,
    /// Deposit initiated, polling its status
    Waiting,
    /// Funds received
    Success,
    /// Initiation or payment failed; the user can retry
    Error,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self::Form
    }
}

impl std::fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Form => write!(f, "form"),
            Self::Confirm => write!(f, "confirm"),
            Self::Waiting => write!(f, "waiting"),
            Self::Success => write!(f, "success"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl WorkflowState {
    /// The workflow has reached an outcome the user must acknowledge
    pub fn is_outcome(&self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }
}

/// User input of the deposit form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositForm {
    /// Amount as typed
    pub amount: String,
    pub provider: Option<Provider>,
    /// "wallet" or an account id
    pub target: String,
    /// MSISDN for mobile-money providers
    pub phone: String,
}

impl Default for DepositForm {
    fn default() -> Self {
        Self {
            amount: String::new(),
            provider: None,
            target: WALLET_TARGET.to_string(),
            phone: String::new(),
        }
    }
}

/// Observable state of a workflow, published on every change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowSnapshot {
    pub state: WorkflowState,
    /// Intent id once initiated
    pub intent_id: Option<String>,
    /// Last observed intent status
    pub intent_status: Option<IntentStatus>,
    /// Informational message ("check your phone", "allocating funds")
    pub message: Option<String>,
    /// General error slot
    pub error: Option<String>,
    /// Whether the status poll timer is running
    pub polling: bool,
}

impl WorkflowSnapshot {
    /// Intent as last observed
    pub fn intent(&self) -> Option<PaymentIntent> {
        Some(PaymentIntent {
            id: self.intent_id.clone()?,
            status: self.intent_status.unwrap_or(IntentStatus::Pending),
        })
    }
}

/// Read-only summary shown on the confirm step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositSummary {
    pub rows: Vec<(String, String)>,
}

impl DepositSummary {
    /// Value of the row with the given label
    pub fn row(&self, label: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }
}

impl std::fmt::Display for DepositSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (label, value) in &self.rows {
            writeln!(f, "{:>12}: {}", label, value)?;
        }
        Ok(())
    }
}

/// Name of a deposit target for display
pub fn target_label(target: &str, accounts: &[Account]) -> String {
    if target == WALLET_TARGET {
        return "Wallet".to_string();
    }
    accounts
        .iter()
        .find(|a| a.id == target)
        .map(Account::display_name)
        .unwrap_or_else(|| format!("Account {}", target))
}

/// Deposit workflow timing and behaviour
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowConfig {
    /// Status poll interval
    pub poll_interval: Duration,
    /// Wait between a success status and the success state
    pub settle_delay: Duration,
    /// Wait before the status check that follows a manual confirmation
    pub manual_check_delay: Duration,
    /// Consecutive failed polls before giving up (None = never)
    pub max_poll_failures: Option<u32>,
    /// Deposit currency
    pub currency: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            settle_delay: Duration::from_millis(1000),
            manual_check_delay: Duration::from_millis(1200),
            max_poll_failures: Some(10),
            currency: "KES".to_string(),
        }
    }
}
