//! Client Session
//!
//! Explicit session context handed to the HTTP client: the bearer token and
//! device id live behind a [`KeyValueStore`], and authentication events are
//! published on a broadcast channel so a front-end can route to its login
//! view when the backend rejects the token.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;

use crate::common::log_session_event;
use crate::device::get_or_create_device_id;
use crate::storage::{keys, KeyValueStore, MemoryKeyValueStore, StorageResult};

/// Authentication events published by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// The backend answered 401; local credentials were cleared
    LoginRequired,
    /// The user signed out locally
    SignedOut,
}

/// Session shared by the API client and the front-end
///
/// Clones share the store and the event channel.
#[derive(Clone)]
pub struct Session {
    store: Arc<dyn KeyValueStore>,
    device_id: Arc<str>,
    events: broadcast::Sender<AuthEvent>,
}

impl Session {
    /// Create a session over the given store, resolving the device id once
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        let device_id: Arc<str> = get_or_create_device_id(store.as_ref()).into();
        let (events, _) = broadcast::channel(16);
        Self {
            store,
            device_id,
            events,
        }
    }

    /// Session backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()))
    }

    /// Device id sent as `X-Device-Id`
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    /// Current bearer token, if any
    ///
    /// A storage failure reads as "no token".
    pub fn token(&self) -> Option<String> {
        match self.store.get(keys::AUTH_TOKEN) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!(target: "vault5::session", error = %e, "failed to read token");
                None
            }
        }
    }

    /// Whether a bearer token is present
    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Store a bearer token
    pub fn set_token(&self, token: &str) -> StorageResult<()> {
        self.store.set(keys::AUTH_TOKEN, token)
    }

    /// Remove local credentials and the cached user
    pub fn clear(&self) {
        for key in [keys::AUTH_TOKEN, keys::USER] {
            if let Err(e) = self.store.remove(key) {
                warn!(target: "vault5::session", key, error = %e, "failed to clear session key");
            }
        }
    }

    /// Sign out locally
    pub fn sign_out(&self) {
        self.clear();
        log_session_event("signed_out", serde_json::json!({}));
        let _ = self.events.send(AuthEvent::SignedOut);
    }

    /// Handle a rejected token: clear credentials and ask for a new login
    pub fn expire(&self) {
        self.clear();
        log_session_event(
            "login_required",
            serde_json::json!({ "device_id": self.device_id.as_ref() }),
        );
        // No subscribers is fine
        let _ = self.events.send(AuthEvent::LoginRequired);
    }

    /// Subscribe to authentication events
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device_id", &self.device_id)
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_roundtrip() {
        let session = Session::in_memory();
        assert!(!session.is_authenticated());

        session.set_token("jwt-abc").unwrap();
        assert_eq!(session.token().as_deref(), Some("jwt-abc"));
        assert!(session.is_authenticated());
    }

    #[test]
    fn test_device_id_stable_for_store() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryKeyValueStore::new());
        let a = Session::new(store.clone());
        let b = Session::new(store);
        assert_eq!(a.device_id(), b.device_id());
    }

    #[tokio::test]
    async fn test_expire_clears_and_notifies() {
        let session = Session::in_memory();
        session.set_token("jwt-abc").unwrap();
        let mut rx = session.subscribe();

        session.expire();

        assert!(session.token().is_none());
        assert_eq!(rx.recv().await.unwrap(), AuthEvent::LoginRequired);
    }

    #[test]
    fn test_disabled_store_reads_as_signed_out() {
        let session = Session::new(Arc::new(MemoryKeyValueStore::disabled()));
        assert!(session.token().is_none());
        assert!(session.set_token("x").is_err());
        assert!(session.device_id().starts_with("dev_"));
    }
}
