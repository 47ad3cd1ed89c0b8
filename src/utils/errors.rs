// src/utils/errors.rs
//! Error taxonomy for the did:ipid method.
//!
//! Every error exposes a stable machine-readable code through `code()` so
//! callers (and the HTTP layer) can branch on the kind of failure without
//! parsing messages.

use crate::models::did::DIDDocument;
use std::error::Error as StdError;
use thiserror::Error;

/// Boxed cause carried by errors that wrap lower-level failures.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Errors raised while mutating a DID document.
///
/// One duplicate/invalid pair per collection: authentication references,
/// public keys and service endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DocumentError {
    #[error("Authentication with same {0} already exists.")]
    DuplicateAuthentication(String),

    #[error("{0}")]
    InvalidAuthentication(String),

    #[error("PublicKey with same {0} already exists.")]
    DuplicatePublicKey(String),

    #[error("{0}")]
    InvalidPublicKey(String),

    #[error("Service with same {0} already exists.")]
    DuplicateService(String),

    #[error("{0}")]
    InvalidService(String),
}

impl DocumentError {
    /// Stable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            DocumentError::DuplicateAuthentication(_) => "DUPLICATE_AUTHENTICATION",
            DocumentError::InvalidAuthentication(_) => "INVALID_AUTHENTICATION",
            DocumentError::DuplicatePublicKey(_) => "DUPLICATE_PUBLICKEY",
            DocumentError::InvalidPublicKey(_) => "INVALID_PUBLICKEY",
            DocumentError::DuplicateService(_) => "DUPLICATE_SERVICE",
            DocumentError::InvalidService(_) => "INVALID_SERVICE",
        }
    }
}

/// Errors raised while decoding externally supplied key material.
#[derive(Debug, Error)]
pub enum KeyError {
    #[error("unsupported PEM label: {0}")]
    UnsupportedPem(String),

    #[error("malformed PEM private key: {0}")]
    MalformedPem(String),

    #[error("malformed libp2p private key: {0}")]
    MalformedProtobuf(String),
}

/// A failed call into the naming/storage backend.
///
/// `op` names the backend primitive (`name_resolve`, `key_import`, ...) so
/// logs show where a publish broke down.
#[derive(Debug, Error)]
#[error("backend operation `{op}` failed: {source}")]
pub struct BackendError {
    pub op: &'static str,
    #[source]
    pub source: BoxError,
}

impl BackendError {
    pub fn new(op: &'static str, source: impl Into<BoxError>) -> Self {
        BackendError {
            op,
            source: source.into(),
        }
    }
}

/// Errors surfaced by the publish/resolve orchestrator.
#[derive(Debug, Error)]
pub enum IpidError {
    #[error("IPFS node is unavailable.")]
    UnavailableBackend,

    /// The DID is malformed, or nothing resolvable was published under it.
    /// The underlying cause, when there is one, is kept as the error source.
    #[error("Invalid DID: {did}")]
    InvalidDid {
        did: String,
        #[source]
        source: Option<BoxError>,
    },

    #[error("Document already exists.")]
    IllegalCreate,

    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error("failed to serialize document: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A publish step failed. `cleanup` holds the error from removing the
    /// ephemeral key afterwards, if that failed too.
    #[error("publish failed: {source}")]
    Backend {
        #[source]
        source: BackendError,
        cleanup: Option<BackendError>,
    },

    /// The record was published but the ephemeral key could not be removed.
    /// `published` is the document that is now live under the DID.
    #[error("ephemeral key `{label}` could not be removed: {source}")]
    KeyCleanup {
        label: String,
        #[source]
        source: BackendError,
        published: Box<DIDDocument>,
    },
}

impl IpidError {
    /// Stable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            IpidError::UnavailableBackend => "IPFS_UNAVAILABLE",
            IpidError::InvalidDid { .. } => "INVALID_DID",
            IpidError::IllegalCreate => "ILLEGAL_CREATE",
            IpidError::InvalidKey(_) => "INVALID_KEY",
            IpidError::Document(inner) => inner.code(),
            IpidError::Serialization(_) => "SERIALIZATION_FAILED",
            IpidError::Backend { .. } => "BACKEND_FAILURE",
            IpidError::KeyCleanup { .. } => "KEY_CLEANUP_FAILED",
        }
    }

    pub(crate) fn invalid_did(did: &str) -> Self {
        IpidError::InvalidDid {
            did: did.to_string(),
            source: None,
        }
    }

    pub(crate) fn unresolvable(did: &str, cause: impl Into<BoxError>) -> Self {
        IpidError::InvalidDid {
            did: did.to_string(),
            source: Some(cause.into()),
        }
    }
}

impl From<BackendError> for IpidError {
    fn from(source: BackendError) -> Self {
        IpidError::Backend {
            source,
            cleanup: None,
        }
    }
}
