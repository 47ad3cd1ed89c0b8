// src/services/ipid.rs
//! Publish/resolve orchestrator for the did:ipid method.
//!
//! Composes the identifier codec, the key adapter, the document builder and a
//! [`NameBackend`] into the three public operations:
//! - `resolve`: DID -> IPNS name -> content path -> document
//! - `create`: publish the first document for a key's DID
//! - `update`: republish an edited copy of the current document
//!
//! # Publishing
//! Every publish imports the caller's key into the backend's key registry
//! under a fresh random label, adds the document, points the IPNS record at
//! it, and removes the label again. Removal happens on every exit path,
//! including a publish future dropped part way through; see [`EphemeralKey`].
//!
//! # Concurrency
//! Calls hold no state between them and take no locks. Two concurrent
//! `create` calls for the same key can both see "not yet published" and both
//! publish; the last publish wins at the naming layer.

use crate::config::IpidConfig;
use crate::document::builder::Document;
use crate::identity::did::{parse_did, Did};
use crate::models::did::DIDDocument;
use crate::models::operation::Operation;
use crate::storage::backend::{NameBackend, PublishOptions};
use crate::utils::errors::{BackendError, DocumentError, IpidError};
use crate::utils::serialization::{deserialize, serialize};
use crate::wallet::key_management::{decode_key, KeyMaterial};
use log::{debug, error, info, warn};
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::sync::Arc;

/// Prefix of every ephemeral registry label.
pub const KEY_LABEL_PREFIX: &str = "ipid-";
const KEY_LABEL_RANDOM_LENGTH: usize = 20;

/// did:ipid client bound to one backend.
pub struct Ipid<B> {
    backend: Arc<B>,
    config: IpidConfig,
}

impl<B: NameBackend + 'static> Ipid<B> {
    /// Wraps `backend`, refusing one that reports itself offline.
    ///
    /// # Errors
    /// `IpidError::UnavailableBackend` if `backend.is_online()` is false. No
    /// other backend call is made.
    pub async fn connect(backend: B, config: IpidConfig) -> Result<Self, IpidError> {
        if !backend.is_online().await {
            return Err(IpidError::UnavailableBackend);
        }
        Ok(Ipid {
            backend: Arc::new(backend),
            config,
        })
    }

    pub fn backend(&self) -> &B {
        self.backend.as_ref()
    }

    pub fn config(&self) -> &IpidConfig {
        &self.config
    }

    /// Fetches the document currently published for `did`.
    ///
    /// # Errors
    /// `IpidError::InvalidDid` if the DID is malformed, or if the name cannot
    /// be resolved, the content cannot be fetched, or it is not a document.
    /// Those causes are not told apart; the underlying error is kept as the
    /// error's source.
    pub async fn resolve(&self, did: &str) -> Result<DIDDocument, IpidError> {
        let parsed = parse_did(did)?;
        self.resolve_parsed(&parsed).await.map_err(|cause| {
            debug!("Could not resolve {}: {}", did, cause);
            IpidError::unresolvable(did, cause)
        })
    }

    async fn resolve_parsed(&self, did: &Did) -> Result<DIDDocument, ResolveFailure> {
        let path = self.backend.name_resolve(did.identifier()).await?;
        let content = self.backend.get(&path).await?;
        Ok(deserialize(&content)?)
    }

    /// Publishes the first document for the DID controlled by `pem`.
    ///
    /// `operations` runs exactly once against a fresh document before
    /// anything is published.
    ///
    /// # Errors
    /// - `IpidError::IllegalCreate` if the DID already resolves (use `update`)
    /// - `IpidError::Document` if `operations` fails; nothing is published
    /// - `IpidError::Backend` / `IpidError::KeyCleanup` from the publish
    pub async fn create<F>(&self, pem: &str, operations: F) -> Result<DIDDocument, IpidError>
    where
        F: FnOnce(&mut Document) -> Result<(), DocumentError>,
    {
        let key = decode_key(pem)?;
        let did = key.did();

        if self.resolve(&did.to_string()).await.is_ok() {
            return Err(IpidError::IllegalCreate);
        }

        let mut document = Document::new(did);
        operations(&mut document)?;

        self.publish(&key, document.into_content()).await
    }

    /// Publishes an edited copy of the document currently published for the
    /// DID controlled by `pem`.
    ///
    /// # Errors
    /// - `IpidError::InvalidDid` if nothing is published yet; there is no
    ///   fallback to `create`
    /// - `IpidError::Document` if `operations` fails; nothing is published
    /// - `IpidError::Backend` / `IpidError::KeyCleanup` from the publish
    pub async fn update<F>(&self, pem: &str, operations: F) -> Result<DIDDocument, IpidError>
    where
        F: FnOnce(&mut Document) -> Result<(), DocumentError>,
    {
        let key = decode_key(pem)?;
        let did = key.did();
        let content = self.resolve(&did.to_string()).await?;

        let mut document = Document::from_content(did, content);
        operations(&mut document)?;

        self.publish(&key, document.into_content()).await
    }

    /// [`Ipid::create`] with operations given as data.
    pub async fn create_with(
        &self,
        pem: &str,
        operations: Vec<Operation>,
    ) -> Result<DIDDocument, IpidError> {
        self.create(pem, move |document| document.apply_all(operations))
            .await
    }

    /// [`Ipid::update`] with operations given as data.
    pub async fn update_with(
        &self,
        pem: &str,
        operations: Vec<Operation>,
    ) -> Result<DIDDocument, IpidError> {
        self.update(pem, move |document| document.apply_all(operations))
            .await
    }

    async fn publish(
        &self,
        key: &KeyMaterial,
        content: DIDDocument,
    ) -> Result<DIDDocument, IpidError> {
        let bytes = serialize(&content)?;
        let ephemeral = EphemeralKey::reserve(Arc::clone(&self.backend)).await?;

        let outcome = async {
            ephemeral.import(key).await?;
            let path = self.backend.add(bytes).await?;
            debug!("Added document for {} at {}", content.id, path);
            let options = PublishOptions {
                key: ephemeral.label().to_string(),
                lifetime: self.config.record_lifetime,
                ttl: self.config.record_lifetime,
            };
            let record = self.backend.name_publish(&path, &options).await?;
            info!("Published {} -> {}", record.name, record.value);
            Ok::<_, BackendError>(content)
        }
        .await;

        ephemeral.release(outcome).await
    }
}

/// Internal cause of a failed resolution, collapsed into `InvalidDid`.
#[derive(Debug, thiserror::Error)]
enum ResolveFailure {
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("content is not a DID document: {0}")]
    Content(#[from] serde_json::Error),
}

/// A registry label reserved for one publish.
///
/// Acquire with [`EphemeralKey::reserve`], import with
/// [`EphemeralKey::import`], and finish with [`EphemeralKey::release`], which
/// consumes the guard and removes the label whatever the outcome was.
///
/// A guard dropped without `release`, because the publish future was
/// cancelled, hands the removal to a background task on the current Tokio
/// runtime.
pub struct EphemeralKey<B: NameBackend + ?Sized + 'static> {
    backend: Arc<B>,
    label: String,
    released: bool,
}

impl<B: NameBackend + ?Sized + 'static> EphemeralKey<B> {
    /// Picks a fresh label and removes any key a crashed run left under it.
    pub async fn reserve(backend: Arc<B>) -> Result<EphemeralKey<B>, IpidError> {
        Self::reserve_as(backend, generate_key_label()).await
    }

    async fn reserve_as(backend: Arc<B>, label: String) -> Result<EphemeralKey<B>, IpidError> {
        remove_key(backend.as_ref(), &label).await?;
        debug!("Reserved ephemeral key label {}", label);
        Ok(EphemeralKey {
            backend,
            label,
            released: false,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Imports `key` under the reserved label.
    pub async fn import(&self, key: &KeyMaterial) -> Result<(), BackendError> {
        self.backend
            .key_import(&self.label, &key.private_key_protobuf())
            .await
    }

    /// Removes the label and folds the cleanup result into `outcome`, the
    /// document the publish put live.
    ///
    /// A failed `outcome` wins over a failed cleanup; the cleanup error is
    /// attached to it. A successful `outcome` with a failed cleanup becomes
    /// `IpidError::KeyCleanup`, which still carries the published document.
    pub async fn release(
        mut self,
        outcome: Result<DIDDocument, BackendError>,
    ) -> Result<DIDDocument, IpidError> {
        let cleanup = remove_key(self.backend.as_ref(), &self.label).await;
        self.released = true;

        match (outcome, cleanup) {
            (Ok(document), Ok(())) => Ok(document),
            (Ok(document), Err(source)) => {
                error!(
                    "Published, but ephemeral key {} was left behind: {}",
                    self.label, source
                );
                Err(IpidError::KeyCleanup {
                    label: std::mem::take(&mut self.label),
                    source,
                    published: Box::new(document),
                })
            }
            (Err(source), Ok(())) => {
                warn!("Publish failed, ephemeral key {} removed: {}", self.label, source);
                Err(IpidError::Backend {
                    source,
                    cleanup: None,
                })
            }
            (Err(source), Err(cleanup)) => {
                error!(
                    "Publish failed ({}) and ephemeral key {} could not be removed: {}",
                    source, self.label, cleanup
                );
                Err(IpidError::Backend {
                    source,
                    cleanup: Some(cleanup),
                })
            }
        }
    }
}

impl<B: NameBackend + ?Sized + 'static> Drop for EphemeralKey<B> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let label = std::mem::take(&mut self.label);
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            error!("Ephemeral key {} dropped outside a runtime and left behind", label);
            return;
        };
        warn!("Publish abandoned, removing ephemeral key {} in the background", label);
        let backend = Arc::clone(&self.backend);
        runtime.spawn(async move {
            match remove_key(backend.as_ref(), &label).await {
                Ok(()) => debug!("Removed abandoned ephemeral key {}", label),
                Err(e) => error!("Abandoned ephemeral key {} could not be removed: {}", label, e),
            }
        });
    }
}

/// `ipid-` followed by 20 random alphanumerics.
pub fn generate_key_label() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(KEY_LABEL_RANDOM_LENGTH)
        .map(char::from)
        .collect();
    format!("{KEY_LABEL_PREFIX}{random}")
}

/// Removes `label` from the registry if present; absence is not an error.
async fn remove_key<B: NameBackend + ?Sized>(
    backend: &B,
    label: &str,
) -> Result<(), BackendError> {
    let keys = backend.key_list().await?;
    if !keys.iter().any(|key| key.name == label) {
        return Ok(());
    }
    backend.key_rm(label).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::did::{PublicKey, Service};
    use crate::storage::memory::{Fault, MemoryBackend};
    use std::error::Error;
    use std::time::Duration;

    async fn setup() -> (Arc<MemoryBackend>, Ipid<Arc<MemoryBackend>>, KeyMaterial, String) {
        let backend = Arc::new(MemoryBackend::new());
        let ipid = Ipid::connect(Arc::clone(&backend), IpidConfig::default())
            .await
            .unwrap();
        let key = KeyMaterial::generate();
        let pem = key.to_pem().unwrap();
        (backend, ipid, key, pem)
    }

    fn add_signing_key(
        key: &KeyMaterial,
    ) -> impl FnOnce(&mut Document) -> Result<(), DocumentError> {
        let public_key = key.public_key_bytes();
        move |document| {
            document.add_public_key(PublicKey::secp256k1_hex(Some("#key-1"), &public_key))?;
            document.add_authentication("#key-1")?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_offline_backend_is_rejected() {
        let backend = Arc::new(MemoryBackend::offline());
        let err = Ipid::connect(Arc::clone(&backend), IpidConfig::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.code(), "IPFS_UNAVAILABLE");
        assert_eq!(backend.call_count().await, 0);
        assert_eq!(backend.publish_count().await, 0);
    }

    #[tokio::test]
    async fn test_create_then_resolve() {
        let (backend, ipid, key, pem) = setup().await;

        let created = ipid.create(&pem, add_signing_key(&key)).await.unwrap();
        assert_eq!(created.id, key.did().to_string());
        assert_eq!(created.authentication, vec![key.did().with_fragment("key-1")]);

        let resolved = ipid.resolve(&key.did().to_string()).await.unwrap();
        assert_eq!(resolved, created);

        let record = backend.record(&key.peer_id()).await.unwrap();
        assert_eq!(record.lifetime, Duration::from_secs(87_600 * 3600));
        assert_eq!(record.ttl, record.lifetime);
    }

    #[tokio::test]
    async fn test_create_twice_fails_without_publishing() {
        let (backend, ipid, key, pem) = setup().await;
        ipid.create(&pem, add_signing_key(&key)).await.unwrap();
        let record = backend.record(&key.peer_id()).await;
        assert_eq!(backend.publish_count().await, 1);

        let mut ran = false;
        let err = ipid
            .create(&pem, |_| {
                ran = true;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ILLEGAL_CREATE");
        assert!(!ran);
        assert_eq!(backend.publish_count().await, 1);
        assert_eq!(backend.record(&key.peer_id()).await, record);
    }

    #[tokio::test]
    async fn test_update_overlays_previous_content() {
        let (_, ipid, key, pem) = setup().await;
        ipid.create(&pem, add_signing_key(&key)).await.unwrap();

        let updated = ipid
            .update(&pem, |document| {
                document.add_service(Service::new(None, "IdentityHub", "https://hub.example.com"))?;
                Ok(())
            })
            .await
            .unwrap();
        assert_eq!(updated.public_key.len(), 1);
        assert_eq!(updated.authentication.len(), 1);
        assert_eq!(updated.service.len(), 1);

        let removed = ipid
            .update(&pem, |document| {
                document.remove_public_key("#key-1");
                Ok(())
            })
            .await
            .unwrap();
        assert!(removed.public_key.is_empty());
        assert!(removed.authentication.is_empty());
        assert_eq!(removed.service.len(), 1);
        assert_eq!(removed.created, updated.created);

        assert_eq!(ipid.resolve(&key.did().to_string()).await.unwrap(), removed);
    }

    #[tokio::test]
    async fn test_update_requires_published_document() {
        let (backend, ipid, _, pem) = setup().await;
        let err = ipid.update(&pem, |_| Ok(())).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_DID");
        assert_eq!(backend.publish_count().await, 0);
    }

    #[tokio::test]
    async fn test_failed_operations_publish_nothing() {
        let (backend, ipid, key, pem) = setup().await;
        let err = ipid
            .create(&pem, |document| {
                document.add_authentication("#missing")?;
                Ok(())
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_AUTHENTICATION");
        assert_eq!(backend.publish_count().await, 0);
        assert!(backend.key_names().await.is_empty());
        assert!(ipid.resolve(&key.did().to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_keys_are_removed_after_success() {
        let (backend, ipid, key, pem) = setup().await;
        ipid.create(&pem, add_signing_key(&key)).await.unwrap();
        ipid.update(&pem, |_| Ok(())).await.unwrap();
        assert!(backend.key_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_removed_after_failures() {
        for fault in [Fault::KeyImport, Fault::Add, Fault::NamePublish] {
            let (backend, ipid, key, pem) = setup().await;
            backend.inject_fault(fault).await;

            let err = ipid.create(&pem, add_signing_key(&key)).await.unwrap_err();
            assert_eq!(err.code(), "BACKEND_FAILURE", "{fault:?}");
            assert!(backend.key_names().await.is_empty(), "{fault:?} left a key behind");
            assert_eq!(backend.publish_count().await, 0);
        }
    }

    #[tokio::test]
    async fn test_publish_error_wins_over_cleanup_error() {
        let (backend, ipid, key, pem) = setup().await;
        backend.inject_fault(Fault::NamePublish).await;
        backend.inject_fault(Fault::KeyRm).await;

        match ipid.create(&pem, add_signing_key(&key)).await.unwrap_err() {
            IpidError::Backend { source, cleanup } => {
                assert_eq!(source.op, "name_publish");
                assert_eq!(cleanup.map(|c| c.op), Some("key_rm"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cleanup_failure_after_publish_is_reported() {
        let (backend, ipid, key, pem) = setup().await;
        backend.inject_fault(Fault::KeyRm).await;

        let err = ipid.create(&pem, add_signing_key(&key)).await.unwrap_err();
        assert_eq!(err.code(), "KEY_CLEANUP_FAILED");
        match err {
            IpidError::KeyCleanup {
                label, published, ..
            } => {
                assert!(label.starts_with(KEY_LABEL_PREFIX));
                assert_eq!(published.id, key.did().to_string());
                assert_eq!(published.authentication.len(), 1);

                backend.clear_faults().await;
                let resolved = ipid.resolve(&key.did().to_string()).await.unwrap();
                assert_eq!(resolved, *published);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(backend.publish_count().await, 1);
    }

    #[tokio::test]
    async fn test_cancelled_publish_removes_key() {
        let (backend, ipid, key, pem) = setup().await;
        backend.stall(Fault::Add).await;

        let mut publish = Box::pin(ipid.create(&pem, add_signing_key(&key)));
        let timed_out = tokio::time::timeout(Duration::from_millis(100), &mut publish).await;
        assert!(timed_out.is_err());
        assert_eq!(backend.key_names().await.len(), 1);
        drop(publish);

        for _ in 0..100 {
            if backend.key_names().await.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(backend.key_names().await.is_empty());
        assert_eq!(backend.publish_count().await, 0);
    }

    #[tokio::test]
    async fn test_reserve_clears_leftover_key() {
        let backend = Arc::new(MemoryBackend::new());
        let label = generate_key_label();
        backend
            .insert_key(&label, &KeyMaterial::generate().private_key_protobuf())
            .await;

        let ephemeral = EphemeralKey::reserve_as(Arc::clone(&backend), label.clone())
            .await
            .unwrap();
        assert!(backend.key_names().await.is_empty());

        let key = KeyMaterial::generate();
        ephemeral.import(&key).await.unwrap();
        assert_eq!(backend.key_names().await, vec![label]);

        let document = DIDDocument::new(&key.did().to_string());
        let released = ephemeral.release(Ok(document.clone())).await.unwrap();
        assert_eq!(released, document);
        assert!(backend.key_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_collapses_causes() {
        let (backend, ipid, key, _) = setup().await;
        let did = key.did().to_string();

        let err = ipid.resolve("did:example:123").await.unwrap_err();
        assert_eq!(err.code(), "INVALID_DID");

        let err = ipid.resolve(&did).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_DID");
        assert!(err.source().is_some());

        backend.insert_record(&key.peer_id(), "/ipfs/missing").await;
        assert_eq!(ipid.resolve(&did).await.unwrap_err().code(), "INVALID_DID");

        backend.insert_blob("/ipfs/missing", b"not json").await;
        let err = ipid.resolve(&did).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_DID");
        let cause = err.source().unwrap().to_string();
        assert!(cause.starts_with("content is not a DID document"), "{cause}");
    }

    #[tokio::test]
    async fn test_operations_as_data() {
        let (_, ipid, key, pem) = setup().await;
        let created = ipid
            .create_with(
                &pem,
                vec![
                    Operation::AddPublicKey {
                        public_key: PublicKey::secp256k1_hex(None, &key.public_key_bytes()),
                    },
                    Operation::AddAuthentication { id: "#key-1".into() },
                ],
            )
            .await
            .unwrap();
        assert_eq!(created.authentication.len(), 1);

        let err = ipid
            .update_with(&pem, vec![Operation::AddAuthentication { id: "#key-1".into() }])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_AUTHENTICATION");
    }

    #[tokio::test]
    async fn test_invalid_key_is_rejected() {
        let (backend, ipid, _, _) = setup().await;
        let err = ipid.create("garbage", |_| Ok(())).await.unwrap_err();
        assert_eq!(err.code(), "INVALID_KEY");
        assert_eq!(backend.publish_count().await, 0);
    }

    #[tokio::test]
    async fn test_custom_lifetime() {
        let backend = Arc::new(MemoryBackend::new());
        let config = IpidConfig {
            record_lifetime: Duration::from_secs(3600),
        };
        let ipid = Ipid::connect(Arc::clone(&backend), config).await.unwrap();
        let key = KeyMaterial::generate();
        ipid.create(&key.to_pem().unwrap(), |_| Ok(())).await.unwrap();

        let record = backend.record(&key.peer_id()).await.unwrap();
        assert_eq!(record.lifetime, Duration::from_secs(3600));
        assert_eq!(record.ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_key_labels_are_unique() {
        let a = generate_key_label();
        let b = generate_key_label();
        assert!(a.starts_with(KEY_LABEL_PREFIX));
        assert_eq!(a.len(), KEY_LABEL_PREFIX.len() + KEY_LABEL_RANDOM_LENGTH);
        assert_ne!(a, b);
    }
}
