// src/models/operation.rs
//! Serializable document operations.
//!
//! Callers that cannot hand the orchestrator a closure (the HTTP API, scripted
//! clients) describe their edits as a list of operations instead. Each maps
//! one-to-one onto a mutation method of the document builder.

use crate::models::did::{PublicKey, Service};
use serde::{Deserialize, Serialize};

/// A single edit to a DID document.
///
/// # JSON Form
/// ```json
/// { "op": "addPublicKey", "publicKey": { "type": "...", "publicKeyHex": "..." } }
/// { "op": "addAuthentication", "id": "#key-1" }
/// { "op": "removeService", "id": "#hub" }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Operation {
    AddPublicKey {
        #[serde(rename = "publicKey")]
        public_key: PublicKey,
    },
    RemovePublicKey {
        id: String,
    },
    AddAuthentication {
        id: String,
    },
    RemoveAuthentication {
        id: String,
    },
    AddService {
        service: Service,
    },
    RemoveService {
        id: String,
    },
}
