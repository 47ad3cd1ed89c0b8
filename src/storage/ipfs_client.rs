// src/storage/ipfs_client.rs
//! IPFS/IPNS backend talking to a Kubo node over its HTTP API.
//!
//! Provides:
//! - content-addressed storage (`add` / `cat`)
//! - IPNS resolution and publishing
//! - management of the node's key registry
//!
//! # Security Considerations
//! - All stored data is public by default (IPFS is a public network)
//! - Imported keys live in the node's keystore until removed; the
//!   orchestrator removes them as soon as a publish completes or is abandoned

use crate::storage::backend::{KeyInfo, NameBackend, PublishOptions, PublishedRecord};
use crate::utils::errors::BackendError;
use async_trait::async_trait;
use bytes::BytesMut;
use futures::TryStreamExt;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Thread-safe IPFS client implementing [`NameBackend`].
///
/// Every primitive is one `POST /api/v0/<command>` against the node's RPC
/// API. The underlying `reqwest` client pools connections and is cheap to
/// clone.
#[derive(Clone)]
pub struct IpfsBackend {
    http: Client,
    api_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorBody {
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResolveResponse {
    path: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AddResponse {
    hash: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PublishResponse {
    name: String,
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyListResponse {
    #[serde(default)]
    keys: Vec<KeyPair>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyPair {
    name: String,
    id: String,
}

impl IpfsBackend {
    /// Creates a client for the node whose API listens at `api_url`
    /// (e.g. `http://localhost:5001`).
    ///
    /// No connection is made here; use [`NameBackend::is_online`] to check reachability.
    pub fn new(api_url: &str) -> Result<Self, BackendError> {
        let api_url = api_url.trim_end_matches('/').to_string();
        let parsed = Url::parse(&api_url).map_err(|e| BackendError::new("connect", e))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(BackendError::new(
                "connect",
                format!("unsupported scheme {}", parsed.scheme()),
            ));
        }
        Ok(IpfsBackend {
            http: Client::new(),
            api_url,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Sends one RPC command and checks its status.
    ///
    /// Failed commands answer with a JSON body whose `Message` becomes the
    /// error text.
    async fn call(
        &self,
        op: &'static str,
        command: &str,
        query: &[(&str, &str)],
        form: Option<Form>,
    ) -> Result<Response, BackendError> {
        let mut request = self
            .http
            .post(format!("{}/api/v0/{}", self.api_url, command))
            .query(query);
        if let Some(form) = form {
            request = request.multipart(form);
        }
        let response = request
            .send()
            .await
            .map_err(|e| BackendError::new(op, e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .map(|err| err.message)
            .unwrap_or(body);
        Err(BackendError::new(op, format!("{status}: {message}")))
    }

    async fn call_json<T: DeserializeOwned>(
        &self,
        op: &'static str,
        command: &str,
        query: &[(&str, &str)],
        form: Option<Form>,
    ) -> Result<T, BackendError> {
        self.call(op, command, query, form)
            .await?
            .json()
            .await
            .map_err(|e| BackendError::new(op, e))
    }
}

/// Renders a duration the way IPFS (Go) parses it: `87600h`, `90m`, `45s`.
pub fn go_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs > 0 && secs % 3600 == 0 {
        format!("{}h", secs / 3600)
    } else if secs > 0 && secs % 60 == 0 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

#[async_trait]
impl NameBackend for IpfsBackend {
    async fn is_online(&self) -> bool {
        match self.call("id", "id", &[], None).await {
            Ok(_) => true,
            Err(e) => {
                debug!("IPFS node at {} is not reachable: {}", self.api_url, e);
                false
            }
        }
    }

    async fn name_resolve(&self, name: &str) -> Result<String, BackendError> {
        let query = [("arg", name), ("recursive", "true")];
        let res: ResolveResponse = self
            .call_json("name_resolve", "name/resolve", &query, None)
            .await?;
        Ok(res.path)
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>, BackendError> {
        let data = self
            .call("get", "cat", &[("arg", path)], None)
            .await?
            .bytes_stream()
            .try_fold(BytesMut::new(), |mut acc, chunk| async move {
                acc.extend_from_slice(&chunk);
                Ok(acc)
            })
            .await
            .map_err(|e| BackendError::new("get", e))?;
        Ok(data.to_vec())
    }

    async fn add(&self, data: Vec<u8>) -> Result<String, BackendError> {
        let form = Form::new().part("file", Part::bytes(data).file_name("document.json"));
        let res: AddResponse = self
            .call_json("add", "add", &[("pin", "true")], Some(form))
            .await?;
        Ok(format!("/ipfs/{}", res.hash))
    }

    async fn name_publish(
        &self,
        path: &str,
        options: &PublishOptions,
    ) -> Result<PublishedRecord, BackendError> {
        let lifetime = go_duration(options.lifetime);
        let ttl = go_duration(options.ttl);
        let query = [
            ("arg", path),
            ("resolve", "true"),
            ("lifetime", lifetime.as_str()),
            ("ttl", ttl.as_str()),
            ("key", options.key.as_str()),
        ];
        let res: PublishResponse = self
            .call_json("name_publish", "name/publish", &query, None)
            .await?;
        Ok(PublishedRecord {
            name: res.name,
            value: res.value,
        })
    }

    async fn key_list(&self) -> Result<Vec<KeyInfo>, BackendError> {
        let res: KeyListResponse = self.call_json("key_list", "key/list", &[], None).await?;
        Ok(res
            .keys
            .into_iter()
            .map(|pair| KeyInfo {
                name: pair.name,
                id: pair.id,
            })
            .collect())
    }

    async fn key_import(&self, name: &str, key: &[u8]) -> Result<(), BackendError> {
        let form = Form::new().part("key", Part::bytes(key.to_vec()).file_name("key"));
        let query = [("arg", name), ("format", "libp2p-protobuf-cleartext")];
        self.call("key_import", "key/import", &query, Some(form))
            .await
            .map(drop)
    }

    async fn key_rm(&self, name: &str) -> Result<(), BackendError> {
        self.call("key_rm", "key/rm", &[("arg", name)], None)
            .await
            .map(drop)
    }
}
