//! Storage Layer Module
//!
//! Local persistence for the client: bearer token, cached user, device id.
//!
//! This module contains:
//! - The key-value storage trait
//! - SQLite implementation for durable state
//! - In-memory implementation for testing

pub mod memory;
pub mod sqlite;
pub mod traits;

// Re-exports for convenience
pub use memory::MemoryKeyValueStore;
pub use sqlite::SqliteKeyValueStore;
pub use traits::{keys, KeyValueStore, StorageError, StorageResult};
