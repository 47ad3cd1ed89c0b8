// src/storage/memory.rs
//! In-process naming/storage backend.
//!
//! Behaves like a single IPFS node with IPNS enabled: blobs are content
//! addressed, keys live in a registry keyed by label, and publishing signs the
//! record with the registry key so the record lands under that key's peer id.
//!
//! Failures and hangs can be injected per primitive, which is how key hygiene
//! on error and cancellation paths is exercised.

use crate::storage::backend::{KeyInfo, NameBackend, PublishOptions, PublishedRecord};
use crate::utils::crypto::content_id;
use crate::utils::errors::BackendError;
use crate::wallet::key_management::KeyMaterial;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

/// Backend primitives that can be forced to fail or hang.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fault {
    NameResolve,
    Get,
    Add,
    NamePublish,
    KeyList,
    KeyImport,
    KeyRm,
}

/// A naming record as held by the in-process registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRecord {
    pub path: String,
    pub lifetime: Duration,
    pub ttl: Duration,
}

#[derive(Default)]
struct MemoryState {
    blobs: HashMap<String, Vec<u8>>,
    records: HashMap<String, NameRecord>,
    /// Label -> libp2p protobuf private key.
    keys: BTreeMap<String, Vec<u8>>,
    faults: HashSet<Fault>,
    stalls: HashSet<Fault>,
    calls: usize,
    publishes: usize,
}

/// Thread-safe in-memory backend.
pub struct MemoryBackend {
    online: bool,
    state: Mutex<MemoryState>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    /// An empty, online backend.
    pub fn new() -> Self {
        MemoryBackend {
            online: true,
            state: Mutex::new(MemoryState::default()),
        }
    }

    /// A backend that reports itself offline.
    pub fn offline() -> Self {
        MemoryBackend {
            online: false,
            ..Self::new()
        }
    }

    /// Makes every subsequent call to `fault`'s primitive fail.
    pub async fn inject_fault(&self, fault: Fault) {
        self.state.lock().await.faults.insert(fault);
    }

    /// Makes every subsequent call to `fault`'s primitive hang forever, like a
    /// node that stopped answering.
    pub async fn stall(&self, fault: Fault) {
        self.state.lock().await.stalls.insert(fault);
    }

    /// Clears injected failures and hangs.
    pub async fn clear_faults(&self) {
        let mut state = self.state.lock().await;
        state.faults.clear();
        state.stalls.clear();
    }

    /// Labels currently present in the key registry.
    pub async fn key_names(&self) -> Vec<String> {
        self.state.lock().await.keys.keys().cloned().collect()
    }

    /// Current record for a routing name, if any.
    pub async fn record(&self, name: &str) -> Option<NameRecord> {
        self.state.lock().await.records.get(name).cloned()
    }

    /// Number of primitive calls made so far, `is_online` excluded.
    pub async fn call_count(&self) -> usize {
        self.state.lock().await.calls
    }

    /// Number of successful `name_publish` calls so far.
    pub async fn publish_count(&self) -> usize {
        self.state.lock().await.publishes
    }

    /// Stores a key directly, bypassing fault injection. Simulates a key left
    /// behind by a crashed process.
    pub async fn insert_key(&self, name: &str, key: &[u8]) {
        self.state
            .lock()
            .await
            .keys
            .insert(name.to_string(), key.to_vec());
    }

    /// Overwrites the bytes behind a path. Simulates a corrupt or foreign blob.
    pub async fn insert_blob(&self, path: &str, data: &[u8]) {
        self.state
            .lock()
            .await
            .blobs
            .insert(path.to_string(), data.to_vec());
    }

    /// Points a routing name at a path without any key.
    pub async fn insert_record(&self, name: &str, path: &str) {
        self.state.lock().await.records.insert(
            name.to_string(),
            NameRecord {
                path: path.to_string(),
                lifetime: Duration::ZERO,
                ttl: Duration::ZERO,
            },
        );
    }

    /// Locks the state for one call to `fault`'s primitive, applying any
    /// injected hang or failure first.
    async fn enter(
        &self,
        fault: Fault,
        op: &'static str,
    ) -> Result<MutexGuard<'_, MemoryState>, BackendError> {
        let mut state = self.state.lock().await;
        state.calls += 1;
        if state.stalls.contains(&fault) {
            drop(state);
            return std::future::pending().await;
        }
        if state.faults.contains(&fault) {
            return Err(BackendError::new(op, "injected fault"));
        }
        Ok(state)
    }
}

#[async_trait]
impl NameBackend for MemoryBackend {
    async fn is_online(&self) -> bool {
        self.online
    }

    async fn name_resolve(&self, name: &str) -> Result<String, BackendError> {
        let state = self.enter(Fault::NameResolve, "name_resolve").await?;
        state
            .records
            .get(name)
            .map(|record| record.path.clone())
            .ok_or_else(|| {
                BackendError::new("name_resolve", format!("could not resolve name {name}"))
            })
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        let state = self.enter(Fault::Get, "get").await?;
        state
            .blobs
            .get(path)
            .cloned()
            .ok_or_else(|| BackendError::new("get", format!("no content at {path}")))
    }

    async fn add(&self, data: Vec<u8>) -> Result<String, BackendError> {
        let mut state = self.enter(Fault::Add, "add").await?;
        let path = format!("/ipfs/{}", content_id(&data));
        state.blobs.entry(path.clone()).or_insert(data);
        Ok(path)
    }

    async fn name_publish(
        &self,
        path: &str,
        options: &PublishOptions,
    ) -> Result<PublishedRecord, BackendError> {
        let mut state = self.enter(Fault::NamePublish, "name_publish").await?;
        let key = state.keys.get(&options.key).ok_or_else(|| {
            BackendError::new("name_publish", format!("no key named {}", options.key))
        })?;
        let name = KeyMaterial::from_private_key_protobuf(key)
            .map_err(|e| BackendError::new("name_publish", e))?
            .peer_id();

        state.records.insert(
            name.clone(),
            NameRecord {
                path: path.to_string(),
                lifetime: options.lifetime,
                ttl: options.ttl,
            },
        );
        state.publishes += 1;
        Ok(PublishedRecord {
            name,
            value: path.to_string(),
        })
    }

    async fn key_list(&self) -> Result<Vec<KeyInfo>, BackendError> {
        let state = self.enter(Fault::KeyList, "key_list").await?;
        Ok(state
            .keys
            .iter()
            .map(|(name, key)| KeyInfo {
                name: name.clone(),
                id: KeyMaterial::from_private_key_protobuf(key)
                    .map(|k| k.peer_id())
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn key_import(&self, name: &str, key: &[u8]) -> Result<(), BackendError> {
        let mut state = self.enter(Fault::KeyImport, "key_import").await?;
        KeyMaterial::from_private_key_protobuf(key)
            .map_err(|e| BackendError::new("key_import", e))?;
        if state.keys.contains_key(name) {
            return Err(BackendError::new(
                "key_import",
                format!("key with name '{name}' already exists"),
            ));
        }
        state.keys.insert(name.to_string(), key.to_vec());
        Ok(())
    }

    async fn key_rm(&self, name: &str) -> Result<(), BackendError> {
        let mut state = self.enter(Fault::KeyRm, "key_rm").await?;
        state
            .keys
            .remove(name)
            .map(drop)
            .ok_or_else(|| BackendError::new("key_rm", format!("no key named {name}")))
    }
}
