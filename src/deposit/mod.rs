//! Deposit Module
//!
//! The deposit dialog as a headless workflow: form model and validation,
//! the state machine, and the background status poller.

pub mod poller;
pub mod types;
pub mod validation;
pub mod workflow;

pub use poller::StatusPoller;
pub use types::{
    target_label, DepositForm, DepositSummary, WorkflowConfig, WorkflowSnapshot, WorkflowState,
    WALLET_TARGET,
};
pub use validation::{is_valid_msisdn, validate, Field, ValidDeposit, ValidationErrors};
pub use workflow::DepositWorkflow;
