//! Device Identifier
//!
//! A stable pseudo-random id sent with every request as `X-Device-Id`, used
//! by the backend for trusted-device checks. Generated once and persisted in
//! the key-value store.

use rand::rngs::{OsRng, StdRng};
use rand::{RngCore, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

use crate::common::log_session_event;
use crate::storage::{keys, KeyValueStore};

/// Prefix of every generated device id
pub const DEVICE_ID_PREFIX: &str = "dev_";

/// Random bytes behind a device id
pub const DEVICE_ID_BYTES: usize = 16;

/// Return the persisted device id, creating and persisting one if needed.
///
/// When the store cannot be read or written the returned id is not
/// persisted and a later call will produce a different value.
pub fn get_or_create_device_id(store: &dyn KeyValueStore) -> String {
    match store.get(keys::DEVICE_ID) {
        Ok(Some(existing)) if !existing.is_empty() => return existing,
        Ok(_) => {}
        Err(e) => {
            warn!(target: "vault5::session", error = %e, "device id storage unavailable");
            return ephemeral_device_id();
        }
    }

    let id = generate_device_id();
    if let Err(e) = store.set(keys::DEVICE_ID, &id) {
        warn!(target: "vault5::session", error = %e, "failed to persist device id");
        return ephemeral_device_id();
    }

    log_session_event(
        "device_id_created",
        serde_json::json!({ "device_id": id }),
    );
    id
}

/// Generate a fresh device id from the operating system's CSPRNG
pub fn generate_device_id() -> String {
    generate_device_id_from(&mut OsRng)
}

/// Generate a device id from `strong`, falling back to a time-seeded PRNG
/// when the source cannot deliver bytes.
pub fn generate_device_id_from<R: RngCore + ?Sized>(strong: &mut R) -> String {
    let mut bytes = [0u8; DEVICE_ID_BYTES];
    if let Err(e) = strong.try_fill_bytes(&mut bytes) {
        warn!(target: "vault5::session", error = %e, "secure random source unavailable, using weak PRNG");
        weak_rng().fill_bytes(&mut bytes);
    }
    format!("{}{}", DEVICE_ID_PREFIX, hex::encode(bytes))
}

/// Non-persisted id built from the current time and weak randomness
pub fn ephemeral_device_id() -> String {
    let mut suffix = [0u8; 4];
    weak_rng().fill_bytes(&mut suffix);
    format!(
        "{}{:x}{}",
        DEVICE_ID_PREFIX,
        unix_millis(),
        hex::encode(suffix)
    )
}

fn weak_rng() -> StdRng {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    StdRng::seed_from_u64(nanos ^ u64::from(std::process::id()))
}

fn unix_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default()
}
