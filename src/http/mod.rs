//! HTTP Layer
//!
//! Authenticated, retrying REST client used by every backend call.

pub mod client;
pub mod retry;

pub use client::{ApiClient, ApiResponse, ClientConfig, HttpError, DEVICE_ID_HEADER};
pub use retry::RetryPolicy;
