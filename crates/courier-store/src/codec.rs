//! Value encoding utilities for `RocksDB`.
//!
//! Every stored value is `version || body`, where `version` is a big-endian
//! `u64` bumped on each write and `body` is the CBOR-encoded record. Keeping
//! the version in a fixed-width header lets precondition checks read it
//! without decoding the record.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{Result, StoreError};

/// Width of the version header in bytes.
pub const VERSION_LEN: usize = 8;

/// Encode a stored value from its version and body.
#[must_use]
pub fn encode_value(version: u64, body: &[u8]) -> Vec<u8> {
    let mut value = Vec::with_capacity(VERSION_LEN + body.len());
    value.extend_from_slice(&version.to_be_bytes());
    value.extend_from_slice(body);
    value
}

/// Split a stored value into its version and body.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if the value is shorter than the header.
pub fn decode_value(value: &[u8]) -> Result<(u64, &[u8])> {
    if value.len() < VERSION_LEN {
        return Err(StoreError::Serialization(format!(
            "stored value too short: {} bytes",
            value.len()
        )));
    }
    let (header, body) = value.split_at(VERSION_LEN);
    let mut bytes = [0u8; VERSION_LEN];
    bytes.copy_from_slice(header);
    Ok((u64::from_be_bytes(bytes), body))
}

/// The version a write produces given the version currently stored.
#[must_use]
pub fn next_version(current: Option<u64>) -> u64 {
    current.map_or(1, |v| v.saturating_add(1))
}

/// Serialize a record using CBOR.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if encoding fails.
pub fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

/// Deserialize a record from CBOR.
///
/// # Errors
///
/// Returns `StoreError::Serialization` if decoding fails.
pub fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
}

/// Select the lock stripe guarding `namespace/key`.
///
/// The namespace is the column family name. Distinct keys may share a
/// stripe; the same key always maps to the same one.
#[must_use]
pub fn lock_stripe(namespace: &str, key: &str, stripes: usize) -> usize {
    let mut hasher = blake3::Hasher::new();
    hasher.update(namespace.as_bytes());
    hasher.update(b"/");
    hasher.update(key.as_bytes());
    let hash = hasher.finalize();

    let mut word = [0u8; 8];
    word.copy_from_slice(&hash.as_bytes()[..8]);
    // Truncation is fine: only the remainder matters.
    #[allow(clippy::cast_possible_truncation)]
    let slot = u64::from_le_bytes(word) as usize;
    slot % stripes.max(1)
}
