// src/models/did.rs
//! DID Document data model.
//!
//! Defines the JSON shape of a did:ipid document, following the layout of the
//! [DID Core Specification](https://www.w3.org/TR/did-core/) drafts the
//! method was written against (`publicKey`, `authentication`, `service`).
//!
//! These types are plain snapshots. Mutation, with its uniqueness rules, goes
//! through [`crate::document::builder::Document`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// JSON-LD context written into every document.
pub const DID_CONTEXT: &str = "https://w3id.org/did/v1";

/// A DID Document, exactly as stored on IPFS.
///
/// # Example
/// ```json
/// {
///   "@context": "https://w3id.org/did/v1",
///   "id": "did:ipid:16Uiu2HAm...",
///   "created": "2024-01-01T00:00:00Z",
///   "updated": "2024-01-01T00:00:00Z",
///   "publicKey": [],
///   "authentication": [],
///   "service": []
/// }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DIDDocument {
    #[serde(rename = "@context")]
    pub context: String,

    /// The complete DID string identifier
    pub id: String,

    pub created: DateTime<Utc>,

    pub updated: DateTime<Utc>,

    #[serde(rename = "publicKey", default)]
    pub public_key: Vec<PublicKey>,

    /// Ids of entries in `public_key` usable for authentication.
    #[serde(default)]
    pub authentication: Vec<String>,

    #[serde(default)]
    pub service: Vec<Service>,
}

impl DIDDocument {
    /// An empty document for `did`, stamped with the current time.
    pub fn new(did: &str) -> Self {
        let now = Utc::now();
        DIDDocument {
            context: DID_CONTEXT.to_string(),
            id: did.to_string(),
            created: now,
            updated: now,
            public_key: Vec::new(),
            authentication: Vec::new(),
            service: Vec::new(),
        }
    }
}

/// A verification key listed in the document.
///
/// Exactly one of the `public_key_*` encodings is expected to be set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    /// Optional on input; the builder assigns `<did>#key-<n>` when absent.
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub key_type: String,

    /// Defaults to the document DID when absent.
    #[serde(default)]
    pub controller: String,

    #[serde(rename = "publicKeyHex", default, skip_serializing_if = "Option::is_none")]
    pub public_key_hex: Option<String>,

    #[serde(rename = "publicKeyBase58", default, skip_serializing_if = "Option::is_none")]
    pub public_key_base58: Option<String>,

    #[serde(rename = "publicKeyPem", default, skip_serializing_if = "Option::is_none")]
    pub public_key_pem: Option<String>,
}

impl PublicKey {
    /// A `Secp256k1VerificationKey2018` entry with a hex encoded key.
    pub fn secp256k1_hex(id: Option<&str>, public_key: &[u8]) -> Self {
        PublicKey {
            id: id.unwrap_or_default().to_string(),
            key_type: "Secp256k1VerificationKey2018".to_string(),
            controller: String::new(),
            public_key_hex: Some(hex::encode(public_key)),
            public_key_base58: None,
            public_key_pem: None,
        }
    }
}

/// A service endpoint advertised by the DID subject.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Service {
    /// Optional on input; the builder assigns `<did>#service-<n>` when absent.
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub service_type: String,

    #[serde(rename = "serviceEndpoint")]
    pub service_endpoint: String,
}

impl Service {
    pub fn new(id: Option<&str>, service_type: &str, service_endpoint: &str) -> Self {
        Service {
            id: id.unwrap_or_default().to_string(),
            service_type: service_type.to_string(),
            service_endpoint: service_endpoint.to_string(),
        }
    }
}
