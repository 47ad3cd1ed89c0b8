// src/lib.rs

//! # did:ipid
//!
//! A DID method backed by IPFS and IPNS. An identity's document is stored as
//! an immutable IPFS blob; the DID is the peer id of the controlling key, and
//! that key's IPNS record points at the current document.
//!
//! ## Architecture Overview
//! 1. **Identity Layer**: `identity::did` derives and parses did:ipid identifiers
//! 2. **Wallet Layer**: `wallet::key_management` decodes PEM keys into libp2p key material
//! 3. **Document Layer**: `document::builder` edits documents with per-list uniqueness
//! 4. **Storage Layer**: `storage` defines the IPFS/IPNS capability and its implementations
//! 5. **Services Layer**: `services::ipid` orchestrates resolve/create/update;
//!    `services::api_server` exposes it over HTTP
//!
//! ## Example
//! ```no_run
//! use ipid::config::IpidConfig;
//! use ipid::models::did::PublicKey;
//! use ipid::services::ipid::Ipid;
//! use ipid::storage::ipfs_client::IpfsBackend;
//! use ipid::wallet::key_management::KeyMaterial;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = IpfsBackend::new("http://localhost:5001")?;
//! let ipid = Ipid::connect(backend, IpidConfig::default()).await?;
//! let key = KeyMaterial::generate();
//! let pem = key.to_pem()?;
//!
//! let document = ipid
//!     .create(&pem, |document| {
//!         let public_key = PublicKey::secp256k1_hex(Some("#key-1"), &key.public_key_bytes());
//!         document.add_public_key(public_key)?;
//!         document.add_authentication("#key-1")?;
//!         Ok(())
//!     })
//!     .await?;
//! assert_eq!(ipid.resolve(&document.id).await?, document);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod document;     // Document builder
pub mod identity;     // DID derivation and parsing
pub mod models;       // Data structures
pub mod services;     // Orchestrator and API
pub mod storage;      // IPFS/IPNS backends
pub mod utils;        // Errors and helpers
pub mod wallet;       // Key material

pub use crate::config::IpidConfig;
pub use crate::services::ipid::Ipid;
pub use crate::utils::errors::{BackendError, DocumentError, IpidError, KeyError};
