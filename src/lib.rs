//! Vault5 Deposit Client
//!
//! Client-side deposit flow for the Vault5 payments backend.
//!
//! ## Layers
//!
//! 1. **Storage** - Key-value persistence for the bearer token and device id
//! 2. **Session** - Explicit token + device id context for the HTTP client
//! 3. **HTTP** - Authenticated client with 401 handling and backoff retry
//! 4. **API** - Typed deposit endpoints behind the `DepositGateway` trait
//! 5. **Deposit** - Form validation, workflow state machine, status poller
//!
//! ## Flow
//!
//! ```text
//! form -> confirm -> initiate -> poll status -> success | error
//! ```

pub mod api;
pub mod common;
pub mod deposit;
pub mod device;
pub mod http;
pub mod session;
pub mod storage;

// Re-exports: API
pub use api::{
    Account, ApiError, DepositGateway, InitiateDepositRequest, IntentStatus, PaymentIntent,
    Provider,
};

// Re-exports: Common
pub use common::{Result, Vault5Config, Vault5Error};

// Re-exports: Deposit workflow
pub use deposit::{
    DepositForm, DepositSummary, DepositWorkflow, Field, ValidationErrors, WorkflowConfig,
    WorkflowSnapshot, WorkflowState,
};

// Re-exports: Device / session
pub use device::get_or_create_device_id;
pub use session::{AuthEvent, Session};

// Re-exports: HTTP
pub use http::{ApiClient, ClientConfig, HttpError, RetryPolicy};

// Re-exports: Storage
pub use storage::{KeyValueStore, MemoryKeyValueStore, SqliteKeyValueStore, StorageError};
