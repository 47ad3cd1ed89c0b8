// src/document/builder.rs
//! Mutable handle over a DID document.
//!
//! The orchestrator hands a `Document` to the caller's operations exactly once
//! per create/update. Every mutation either succeeds completely or leaves the
//! document untouched, so a failed operation never leaks a half-applied edit
//! into a publish.

use crate::identity::did::Did;
use crate::models::did::{DIDDocument, PublicKey, Service};
use crate::models::operation::Operation;
use crate::utils::errors::DocumentError;
use chrono::Utc;

/// Builder over a [`DIDDocument`] scoped to one DID.
#[derive(Debug, Clone)]
pub struct Document {
    did: Did,
    content: DIDDocument,
}

impl Document {
    /// A fresh, empty document for `did`.
    pub fn new(did: Did) -> Self {
        let content = DIDDocument::new(&did.to_string());
        Document { did, content }
    }

    /// A document pre-populated with previously published content.
    ///
    /// The stored `id` is overwritten with `did`: the key that signs the
    /// update is what decides which identifier the document belongs to.
    pub fn from_content(did: Did, mut content: DIDDocument) -> Self {
        content.id = did.to_string();
        Document { did, content }
    }

    pub fn did(&self) -> &Did {
        &self.did
    }

    /// Snapshot of the current content.
    pub fn get_content(&self) -> &DIDDocument {
        &self.content
    }

    pub fn into_content(self) -> DIDDocument {
        self.content
    }

    /// Adds a public key, returning the stored entry.
    ///
    /// An empty `id` is replaced by the next free `<did>#key-<n>`; relative ids
    /// are expanded against the DID. An empty `controller` defaults to the DID.
    ///
    /// # Errors
    /// - `InvalidPublicKey` if `type` is empty or not exactly one key encoding is set
    /// - `DuplicatePublicKey` if a key with the same id already exists
    pub fn add_public_key(
        &mut self,
        mut public_key: PublicKey,
    ) -> Result<&PublicKey, DocumentError> {
        if public_key.key_type.trim().is_empty() {
            return Err(DocumentError::InvalidPublicKey(
                "Public key type is required.".into(),
            ));
        }
        let encodings = [
            &public_key.public_key_hex,
            &public_key.public_key_base58,
            &public_key.public_key_pem,
        ]
        .iter()
        .filter(|encoding| encoding.as_deref().is_some_and(|v| !v.is_empty()))
        .count();
        if encodings != 1 {
            return Err(DocumentError::InvalidPublicKey(
                "Exactly one public key encoding is required.".into(),
            ));
        }

        public_key.id = if public_key.id.is_empty() {
            let taken: Vec<&str> = self.content.public_key.iter().map(|k| k.id.as_str()).collect();
            self.next_id("key", &taken)
        } else {
            self.expand_id(&public_key.id)
        };
        if public_key.controller.is_empty() {
            public_key.controller = self.did.to_string();
        }
        if self.content.public_key.iter().any(|k| k.id == public_key.id) {
            return Err(DocumentError::DuplicatePublicKey(public_key.id));
        }

        let index = self.content.public_key.len();
        self.content.public_key.push(public_key);
        self.touch();
        Ok(&self.content.public_key[index])
    }

    /// Removes a public key and every authentication reference to it.
    ///
    /// Returns `false` if no key has that id.
    pub fn remove_public_key(&mut self, id: &str) -> bool {
        let id = self.expand_id(id);
        let before = self.content.public_key.len();
        self.content.public_key.retain(|k| k.id != id);
        if self.content.public_key.len() == before {
            return false;
        }
        self.content.authentication.retain(|auth| *auth != id);
        self.touch();
        true
    }

    /// Marks an existing public key as usable for authentication.
    ///
    /// # Errors
    /// - `InvalidAuthentication` if no public key in the document has that id
    /// - `DuplicateAuthentication` if the key is already referenced
    pub fn add_authentication(&mut self, id: &str) -> Result<&str, DocumentError> {
        let id = self.expand_id(id);
        if !self.content.public_key.iter().any(|k| k.id == id) {
            return Err(DocumentError::InvalidAuthentication(format!(
                "Authentication {id} does not reference a public key in this document."
            )));
        }
        if self.content.authentication.contains(&id) {
            return Err(DocumentError::DuplicateAuthentication(id));
        }

        let index = self.content.authentication.len();
        self.content.authentication.push(id);
        self.touch();
        Ok(&self.content.authentication[index])
    }

    /// Returns `false` if the id was not referenced.
    pub fn remove_authentication(&mut self, id: &str) -> bool {
        let id = self.expand_id(id);
        let before = self.content.authentication.len();
        self.content.authentication.retain(|auth| *auth != id);
        let removed = self.content.authentication.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Adds a service endpoint, returning the stored entry.
    ///
    /// # Errors
    /// - `InvalidService` if `type` or `serviceEndpoint` is empty
    /// - `DuplicateService` if a service with the same id already exists
    pub fn add_service(&mut self, mut service: Service) -> Result<&Service, DocumentError> {
        if service.service_type.trim().is_empty() {
            return Err(DocumentError::InvalidService("Service type is required.".into()));
        }
        if service.service_endpoint.trim().is_empty() {
            return Err(DocumentError::InvalidService(
                "Service endpoint is required.".into(),
            ));
        }

        service.id = if service.id.is_empty() {
            let taken: Vec<&str> = self.content.service.iter().map(|s| s.id.as_str()).collect();
            self.next_id("service", &taken)
        } else {
            self.expand_id(&service.id)
        };
        if self.content.service.iter().any(|s| s.id == service.id) {
            return Err(DocumentError::DuplicateService(service.id));
        }

        let index = self.content.service.len();
        self.content.service.push(service);
        self.touch();
        Ok(&self.content.service[index])
    }

    /// Returns `false` if no service has that id.
    pub fn remove_service(&mut self, id: &str) -> bool {
        let id = self.expand_id(id);
        let before = self.content.service.len();
        self.content.service.retain(|s| s.id != id);
        let removed = self.content.service.len() != before;
        if removed {
            self.touch();
        }
        removed
    }

    /// Applies one serialized operation.
    ///
    /// Removing an entry that does not exist is not an error.
    pub fn apply(&mut self, operation: Operation) -> Result<(), DocumentError> {
        match operation {
            Operation::AddPublicKey { public_key } => self.add_public_key(public_key).map(drop),
            Operation::RemovePublicKey { id } => {
                self.remove_public_key(&id);
                Ok(())
            }
            Operation::AddAuthentication { id } => self.add_authentication(&id).map(drop),
            Operation::RemoveAuthentication { id } => {
                self.remove_authentication(&id);
                Ok(())
            }
            Operation::AddService { service } => self.add_service(service).map(drop),
            Operation::RemoveService { id } => {
                self.remove_service(&id);
                Ok(())
            }
        }
    }

    /// Applies operations in order, stopping at the first failure.
    pub fn apply_all(
        &mut self,
        operations: impl IntoIterator<Item = Operation>,
    ) -> Result<(), DocumentError> {
        operations.into_iter().try_for_each(|op| self.apply(op))
    }

    fn expand_id(&self, id: &str) -> String {
        if id.starts_with("did:") {
            id.to_string()
        } else {
            self.did.with_fragment(id)
        }
    }

    /// First `<did>#<prefix>-<n>` not already in use.
    fn next_id(&self, prefix: &str, taken: &[&str]) -> String {
        let mut n = 1;
        loop {
            let candidate = self.did.with_fragment(&format!("{prefix}-{n}"));
            if !taken.contains(&candidate.as_str()) {
                return candidate;
            }
            n += 1;
        }
    }

    fn touch(&mut self) {
        self.content.updated = Utc::now();
    }
}
