//! Payments API Module
//!
//! Typed calls to the Vault5 payments backend:
//!
//! - `GET /api/accounts` - Deposit targets
//! - `POST /api/payments/deposits/initiate` - Start a deposit
//! - `GET /api/payments/transactions/:id/status` - Poll a payment intent
//! - `POST /api/payments/deposits/confirm` - Manual confirmation

pub mod gateway;
pub mod types;

pub use gateway::{
    extract_error_message, transaction_status_path, ApiError, DepositGateway, ACCOUNTS_PATH,
    CONFIRM_DEPOSIT_PATH, INITIATE_DEPOSIT_PATH,
};
#[cfg(test)]
pub use gateway::MockDepositGateway;
pub use types::{
    Account, ConfirmDepositRequest, Envelope, InitiateDepositRequest, IntentStatus, PaymentIntent,
    Provider,
};
