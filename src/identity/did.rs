// src/identity/did.rs
//! Identifier codec for the `did:ipid` method.
//!
//! A did:ipid identifier is `did:ipid:<peer id>`, where the peer id is the
//! base58btc multihash of a libp2p protobuf public key. The peer id doubles as
//! the IPNS name the identity's document is published under, which is what
//! makes the identifier resolvable without a registry.

use crate::utils::errors::IpidError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Method prefix shared by every did:ipid identifier.
pub const DID_PREFIX: &str = "did:ipid:";

/// Multihash code for the identity "hash".
const MULTIHASH_IDENTITY: u8 = 0x00;
/// Multihash code for sha2-256.
const MULTIHASH_SHA2_256: u8 = 0x12;
/// libp2p inlines public keys up to this size instead of hashing them.
const MAX_INLINE_KEY_LENGTH: usize = 42;

/// A parsed did:ipid identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did {
    /// Base58 peer id, i.e. the IPNS routing name.
    identifier: String,
}

impl Did {
    /// The IPNS name this identifier resolves through.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Expands a fragment (`#key-1`) or bare fragment name (`key-1`) into an
    /// id under this DID.
    pub fn with_fragment(&self, fragment: &str) -> String {
        format!("{}#{}", self, fragment.trim_start_matches('#'))
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", DID_PREFIX, self.identifier)
    }
}

impl std::str::FromStr for Did {
    type Err = IpidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_did(s)
    }
}

impl TryFrom<String> for Did {
    type Error = IpidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        parse_did(&value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.to_string()
    }
}

/// Computes the base58 peer id for a libp2p protobuf public key.
///
/// Keys up to 42 bytes are inlined with the identity multihash; larger keys
/// (RSA) are hashed with sha2-256.
pub fn peer_id_from_public_key(public_key_protobuf: &[u8]) -> String {
    let mut multihash = Vec::with_capacity(34usize.max(public_key_protobuf.len() + 2));
    if public_key_protobuf.len() <= MAX_INLINE_KEY_LENGTH {
        multihash.push(MULTIHASH_IDENTITY);
        multihash.push(public_key_protobuf.len() as u8);
        multihash.extend_from_slice(public_key_protobuf);
    } else {
        multihash.push(MULTIHASH_SHA2_256);
        multihash.push(32);
        multihash.extend_from_slice(&Sha256::digest(public_key_protobuf));
    }
    bs58::encode(multihash).into_string()
}

/// Derives the DID for a libp2p protobuf public key.
///
/// Pure and deterministic: the same key always yields the same identifier.
pub fn generate_did(public_key_protobuf: &[u8]) -> Did {
    Did {
        identifier: peer_id_from_public_key(public_key_protobuf),
    }
}

/// Parses a `did:ipid:<peer id>` string.
///
/// # Errors
/// `IpidError::InvalidDid` when the method prefix is wrong, the identifier is
/// not base58, or it does not decode to an identity or sha2-256 multihash.
pub fn parse_did(did: &str) -> Result<Did, IpidError> {
    let identifier = did
        .strip_prefix(DID_PREFIX)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| IpidError::invalid_did(did))?;

    let bytes = bs58::decode(identifier)
        .into_vec()
        .map_err(|e| IpidError::unresolvable(did, e))?;

    let valid = match bytes.as_slice() {
        [MULTIHASH_IDENTITY, len, digest @ ..] => {
            *len as usize == digest.len() && !digest.is_empty()
        }
        [MULTIHASH_SHA2_256, 32, digest @ ..] => digest.len() == 32,
        _ => false,
    };
    if !valid {
        return Err(IpidError::invalid_did(did));
    }

    Ok(Did {
        identifier: identifier.to_string(),
    })
}
