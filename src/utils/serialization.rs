// src/utils/serialization.rs
//! Serialization utilities for stored documents.
//!
//! Documents travel to and from the content store as JSON bytes.

use serde::{de::DeserializeOwned, Serialize};

/// Serializes a value to JSON bytes.
///
/// # Returns
/// - `Ok(Vec<u8>)` with the JSON representation on success
/// - `Err(serde_json::Error)` if serialization fails
pub fn serialize<T: Serialize>(data: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(data)
}

/// Deserializes a value from JSON bytes.
///
/// Leading and trailing whitespace is tolerated, which covers blobs added by
/// tools that append a newline.
pub fn deserialize<T: DeserializeOwned>(data: &[u8]) -> Result<T, serde_json::Error> {
    serde_json::from_slice(data)
}
