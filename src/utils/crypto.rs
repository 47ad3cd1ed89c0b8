// src/utils/crypto.rs
//! Content addressing helpers.
//!
//! Uses SHA-256, the default hash of IPFS, so identifiers produced in-process
//! have the same shape as those a real node returns.

use sha2::{Digest, Sha256};

/// Computes a SHA-256 hash of the input data.
///
/// # Returns
/// Fixed-size 32-byte array (`[u8; 32]`) containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// CIDv0 (`Qm...`) for a blob: base58 of the sha2-256 multihash.
pub fn content_id(data: &[u8]) -> String {
    let mut multihash = Vec::with_capacity(34);
    multihash.extend_from_slice(&[0x12, 0x20]);
    multihash.extend_from_slice(&hash_data(data));
    bs58::encode(multihash).into_string()
}
