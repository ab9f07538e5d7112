//! Storage Trait Definitions
//!
//! Key-value interface for the client's local state (bearer token, device
//! id). Implementations can use SQLite (default) or memory (testing).

use thiserror::Error;

/// Well-known keys
pub mod keys {
    /// Bearer token of the signed-in user
    pub const AUTH_TOKEN: &str = "token";
    /// Cached profile of the signed-in user
    pub const USER: &str = "user";
    /// Stable device identifier
    pub const DEVICE_ID: &str = "vault5_device_id";
}

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Key-value storage interface
///
/// Implementations:
/// - `SqliteKeyValueStore` - Persistent storage with SQLite
/// - `MemoryKeyValueStore` - In-memory storage for testing
pub trait KeyValueStore: Send + Sync {
    /// Read a value
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Insert or replace a value
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove a value, returning whether it existed
    fn remove(&self, key: &str) -> StorageResult<bool>;
}
