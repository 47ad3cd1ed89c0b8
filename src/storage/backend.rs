// src/storage/backend.rs
//! The naming/storage capability the orchestrator is built on.
//!
//! Two independent systems sit behind this trait:
//! - an immutable, content-addressed blob store (`add` / `get`)
//! - a mutable naming layer with its own key registry
//!   (`name_resolve` / `name_publish` / `key_*`)
//!
//! Implementations: [`crate::storage::ipfs_client::IpfsBackend`] for a live
//! IPFS node and [`crate::storage::memory::MemoryBackend`] for in-process use.

use crate::utils::errors::BackendError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Options for a naming-record publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOptions {
    /// Registry label of the key that signs the record.
    pub key: String,
    /// How long the record stays valid.
    pub lifetime: Duration,
    /// How long resolvers may cache the record.
    pub ttl: Duration,
}

/// Confirmation returned by a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedRecord {
    /// The routing name the record was published under.
    pub name: String,
    /// The content path the name now points at.
    pub value: String,
}

/// An entry of the backend's key registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    pub name: String,
    /// Peer id of the key.
    pub id: String,
}

/// Content-addressed store plus mutable naming registry.
///
/// Every method is a suspension point; callers preserve ordering by awaiting
/// each call before issuing the next.
#[async_trait]
pub trait NameBackend: Send + Sync {
    /// Whether the backend can currently serve requests.
    async fn is_online(&self) -> bool;

    /// Resolves a routing name to the content path it points at.
    async fn name_resolve(&self, name: &str) -> Result<String, BackendError>;

    /// Fetches the bytes stored at a content path.
    async fn get(&self, path: &str) -> Result<Vec<u8>, BackendError>;

    /// Stores bytes immutably, returning their content path.
    async fn add(&self, data: Vec<u8>) -> Result<String, BackendError>;

    /// Points the name of `options.key` at `path`.
    async fn name_publish(
        &self,
        path: &str,
        options: &PublishOptions,
    ) -> Result<PublishedRecord, BackendError>;

    async fn key_list(&self) -> Result<Vec<KeyInfo>, BackendError>;

    /// Imports a libp2p protobuf private key under `name`.
    async fn key_import(&self, name: &str, key: &[u8]) -> Result<(), BackendError>;

    async fn key_rm(&self, name: &str) -> Result<(), BackendError>;
}

#[async_trait]
impl<T: NameBackend + ?Sized> NameBackend for Arc<T> {
    async fn is_online(&self) -> bool {
        (**self).is_online().await
    }

    async fn name_resolve(&self, name: &str) -> Result<String, BackendError> {
        (**self).name_resolve(name).await
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        (**self).get(path).await
    }

    async fn add(&self, data: Vec<u8>) -> Result<String, BackendError> {
        (**self).add(data).await
    }

    async fn name_publish(
        &self,
        path: &str,
        options: &PublishOptions,
    ) -> Result<PublishedRecord, BackendError> {
        (**self).name_publish(path, options).await
    }

    async fn key_list(&self) -> Result<Vec<KeyInfo>, BackendError> {
        (**self).key_list().await
    }

    async fn key_import(&self, name: &str, key: &[u8]) -> Result<(), BackendError> {
        (**self).key_import(name, key).await
    }

    async fn key_rm(&self, name: &str) -> Result<(), BackendError> {
        (**self).key_rm(name).await
    }
}
