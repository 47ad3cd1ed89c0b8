// src/services/api_server.rs
//! API Server for the did:ipid method
//!
//! Exposes the orchestrator over HTTP so clients without an IPFS node of their
//! own can resolve, create and update identities.
//!
//! The API is built using Axum and includes endpoints for:
//! - DID resolution
//! - DID creation and updates, with document edits given as [`Operation`]s
//! - a liveness check
//!
//! Failures are returned as `{ "code": ..., "message": ... }` using the
//! stable error codes of [`IpidError`].

use crate::models::did::DIDDocument;
use crate::models::operation::Operation;
use crate::services::ipid::Ipid;
use crate::storage::backend::NameBackend;
use crate::utils::errors::IpidError;
use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Router,
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;

// API request and response structures

/// Request payload for creating or updating a DID document
#[derive(Serialize, Deserialize)]
pub struct PublishRequest {
    /// PEM encoded secp256k1 private key controlling the DID
    pub pem: String,
    /// Edits applied, in order, before publishing
    #[serde(default)]
    pub operations: Vec<Operation>,
}

/// Error body for every failed request
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

/// Wrapper mapping orchestrator errors onto HTTP responses
pub struct ApiError(IpidError);

impl From<IpidError> for ApiError {
    fn from(err: IpidError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            IpidError::InvalidDid { .. } => StatusCode::NOT_FOUND,
            IpidError::IllegalCreate => StatusCode::CONFLICT,
            IpidError::InvalidKey(_) | IpidError::Document(_) => StatusCode::BAD_REQUEST,
            IpidError::UnavailableBackend => StatusCode::SERVICE_UNAVAILABLE,
            IpidError::Backend { .. } | IpidError::KeyCleanup { .. } => StatusCode::BAD_GATEWAY,
            IpidError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!("Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            code: self.0.code().to_string(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// API server state: the orchestrator shared by every handler
pub struct ApiServer<B> {
    ipid: Arc<Ipid<B>>,
}

impl<B: NameBackend + 'static> ApiServer<B> {
    /// Creates a new instance of the API server
    pub fn new(ipid: Ipid<B>) -> Self {
        ApiServer {
            ipid: Arc::new(ipid),
        }
    }

    /// Builds the router with all API routes
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(Self::health_handler))
            .route("/resolve-did/:did", get(Self::resolve_did_handler))
            .route("/create-did", post(Self::create_did_handler))
            .route("/update-did", put(Self::update_did_handler))
            .with_state(Arc::clone(&self.ipid))
    }

    /// Starts the API server and begins listening for requests
    ///
    /// # Arguments
    /// * `addr` - Socket address to bind to (e.g., "127.0.0.1:3000")
    pub async fn run(&self, addr: SocketAddr) -> std::io::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("API server listening on http://{}", addr);
        axum::serve(listener, self.router()).await
    }

    async fn health_handler() -> StatusCode {
        StatusCode::OK
    }

    /// Resolves a DID to its document
    ///
    /// # Endpoint
    /// GET /resolve-did/:did
    ///
    /// # Responses
    /// - 200 OK: Returns the DID document
    /// - 404 Not Found: Malformed DID or nothing published under it
    async fn resolve_did_handler(
        State(ipid): State<Arc<Ipid<B>>>,
        Path(did): Path<String>,
    ) -> Result<Json<DIDDocument>, ApiError> {
        Ok(Json(ipid.resolve(&did).await?))
    }

    /// Publishes the first document for the key's DID
    ///
    /// # Endpoint
    /// POST /create-did
    ///
    /// # Responses
    /// - 200 OK: Returns the published document
    /// - 400 Bad Request: Invalid key or rejected operation
    /// - 409 Conflict: A document is already published for this DID
    /// - 502 Bad Gateway: IPFS failed during publish
    async fn create_did_handler(
        State(ipid): State<Arc<Ipid<B>>>,
        Json(payload): Json<PublishRequest>,
    ) -> Result<Json<DIDDocument>, ApiError> {
        Ok(Json(ipid.create_with(&payload.pem, payload.operations).await?))
    }

    /// Publishes an edited copy of the key's current document
    ///
    /// # Endpoint
    /// PUT /update-did
    ///
    /// # Responses
    /// - 200 OK: Returns the published document
    /// - 400 Bad Request: Invalid key or rejected operation
    /// - 404 Not Found: Nothing published for this DID yet
    /// - 502 Bad Gateway: IPFS failed during publish
    async fn update_did_handler(
        State(ipid): State<Arc<Ipid<B>>>,
        Json(payload): Json<PublishRequest>,
    ) -> Result<Json<DIDDocument>, ApiError> {
        Ok(Json(ipid.update_with(&payload.pem, payload.operations).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IpidConfig;
    use crate::models::did::PublicKey;
    use crate::storage::memory::MemoryBackend;
    use crate::wallet::key_management::KeyMaterial;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use serde::de::DeserializeOwned;
    use tower::ServiceExt;

    async fn test_router() -> Router {
        let ipid = Ipid::connect(MemoryBackend::new(), IpidConfig::default())
            .await
            .unwrap();
        ApiServer::new(ipid).router()
    }

    async fn call<T: DeserializeOwned>(
        router: &Router,
        method: Method,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, T) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let request = match body {
            Some(body) => request.body(Body::from(body.to_string())).unwrap(),
            None => request.body(Body::empty()).unwrap(),
        };
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_create_resolve_update_flow() {
        let router = test_router().await;
        let key = KeyMaterial::generate();
        let pem = key.to_pem().unwrap();
        let did = key.did().to_string();

        let create = serde_json::json!({
            "pem": pem,
            "operations": [
                {
                    "op": "addPublicKey",
                    "publicKey": PublicKey::secp256k1_hex(None, &key.public_key_bytes())
                },
                {"op": "addAuthentication", "id": "#key-1"}
            ]
        });
        let (status, created): (_, DIDDocument) =
            call(&router, Method::POST, "/create-did", Some(create.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created.id, did);

        let (status, resolved): (_, DIDDocument) =
            call(&router, Method::GET, &format!("/resolve-did/{did}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resolved, created);

        let (status, err): (_, ErrorResponse) =
            call(&router, Method::POST, "/create-did", Some(create)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(err.code, "ILLEGAL_CREATE");

        let update = serde_json::json!({
            "pem": pem,
            "operations": [
                {
                    "op": "addService",
                    "service": {"type": "IdentityHub", "serviceEndpoint": "https://hub.example.com"}
                }
            ]
        });
        let (status, updated): (_, DIDDocument) =
            call(&router, Method::PUT, "/update-did", Some(update)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated.public_key.len(), 1);
        assert_eq!(updated.service.len(), 1);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let router = test_router().await;

        let (status, err): (_, ErrorResponse) =
            call(&router, Method::GET, "/resolve-did/did:ipid:nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "INVALID_DID");

        let (status, err): (_, ErrorResponse) = call(
            &router,
            Method::POST,
            "/create-did",
            Some(serde_json::json!({"pem": "garbage"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "INVALID_KEY");

        let pem = KeyMaterial::generate().to_pem().unwrap();
        let (status, err): (_, ErrorResponse) = call(
            &router,
            Method::PUT,
            "/update-did",
            Some(serde_json::json!({"pem": pem, "operations": []})),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(err.code, "INVALID_DID");

        let (status, err): (_, ErrorResponse) = call(
            &router,
            Method::POST,
            "/create-did",
            Some(serde_json::json!({
                "pem": pem,
                "operations": [{"op": "addAuthentication", "id": "#key-1"}]
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "INVALID_AUTHENTICATION");
    }

    #[test]
    fn test_status_mapping() {
        let cases = [
            (IpidError::UnavailableBackend, StatusCode::SERVICE_UNAVAILABLE),
            (IpidError::IllegalCreate, StatusCode::CONFLICT),
            (
                IpidError::Backend {
                    source: crate::utils::errors::BackendError::new("add", "disk full"),
                    cleanup: None,
                },
                StatusCode::BAD_GATEWAY,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError(err).status(), status);
        }
    }
}
