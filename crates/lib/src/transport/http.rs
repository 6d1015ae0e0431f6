//! HTTP transport: axum server and reqwest client.
//!
//! Serves the federation endpoints under `/friends/v1` and sends
//! outbound peer requests as JSON over HTTP with a bounded timeout and a
//! fixed redirect cap. No automatic retries: a timed-out or non-success
//! response is a failure the caller surfaces.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use tokio::sync::{Mutex, oneshot};
use tracing::debug;

use super::{Transport, TransportError, shared::ServerState};
use crate::{
    Result,
    constants::{PEER_REQUEST_MAX_REDIRECTS, PEER_REQUEST_TIMEOUT_SECS, REST_NAMESPACE},
    handshake::{
        RequestHandler,
        protocol::{
            AcceptMessage, ErrorBody, FriendRequestMessage, Hello, PostDeletedNotice,
            RemoteMessage, RestRequest, RestResponse,
        },
    },
};

/// HTTP transport implementation using axum and reqwest.
pub struct HttpTransport {
    server_state: Mutex<ServerState>,
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new HTTP transport instance.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(PEER_REQUEST_TIMEOUT_SECS))
            .redirect(reqwest::redirect::Policy::limited(PEER_REQUEST_MAX_REDIRECTS))
            .build()
            .map_err(|e| TransportError::ClientInit(e.to_string()))?;
        Ok(Self {
            server_state: Mutex::new(ServerState::new()),
            client,
        })
    }

    /// Create the axum router for the federation endpoints.
    fn create_router(handler: Arc<dyn RequestHandler>) -> Router {
        Router::new()
            .route(&format!("/{REST_NAMESPACE}/hello"), get(handle_hello))
            .route(
                &format!("/{REST_NAMESPACE}/friend-request"),
                post(handle_friend_request),
            )
            .route(
                &format!("/{REST_NAMESPACE}/accept-friend-request"),
                post(handle_accept_friend_request),
            )
            .route(
                &format!("/{REST_NAMESPACE}/post-deleted"),
                post(handle_post_deleted),
            )
            .route(&format!("/{REST_NAMESPACE}/message"), post(handle_message))
            .with_state(handler)
    }

    fn endpoint_url(base_url: &str, endpoint: &str) -> String {
        let base = base_url.trim_end_matches('/');
        format!("{base}/{REST_NAMESPACE}/{endpoint}")
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        url: &str,
        response: reqwest::Response,
    ) -> Result<std::result::Result<T, ErrorBody>> {
        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN {
            let body: ErrorBody = response.json().await.map_err(|e| {
                TransportError::Network(format!("Failed to parse error response: {e}"))
            })?;
            return Ok(Err(body));
        }
        if !status.is_success() {
            return Err(TransportError::Network(format!(
                "Peer {url} returned error status: {status}"
            ))
            .into());
        }
        let body: T = response
            .json()
            .await
            .map_err(|e| TransportError::Network(format!("Failed to parse response: {e}")))?;
        Ok(Ok(body))
    }

    async fn post_json<B: serde::Serialize, T: serde::de::DeserializeOwned>(
        &self,
        base_url: &str,
        endpoint: &str,
        body: &B,
    ) -> Result<std::result::Result<T, ErrorBody>> {
        let url = Self::endpoint_url(base_url, endpoint);
        debug!(url = %url, "Sending peer request");
        let response = self.client.post(&url).json(body).send().await.map_err(|e| {
            TransportError::ConnectionFailed {
                address: base_url.to_string(),
                reason: e.to_string(),
            }
        })?;
        Self::parse_response(&url, response).await
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn start_server(&self, addr: &str, handler: Arc<dyn RequestHandler>) -> Result<()> {
        let mut server_state = self.server_state.lock().await;
        if server_state.is_running() {
            return Err(TransportError::ServerAlreadyRunning {
                address: addr.to_string(),
            }
            .into());
        }

        let socket_addr: SocketAddr = addr.parse().map_err(|e| TransportError::ServerBind {
            address: addr.to_string(),
            reason: format!("Invalid address: {e}"),
        })?;

        let listener = tokio::net::TcpListener::bind(socket_addr).await.map_err(|e| {
            TransportError::ServerBind {
                address: addr.to_string(),
                reason: e.to_string(),
            }
        })?;
        // The bound address matters when the caller asked for port 0.
        let actual_addr = listener.local_addr().map_err(|e| TransportError::ServerBind {
            address: addr.to_string(),
            reason: e.to_string(),
        })?;

        let router = Self::create_router(handler);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            let serve = axum::serve(listener, router).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            if let Err(e) = serve.await {
                tracing::error!(error = %e, "Federation server failed");
            }
        });

        server_state.server_started(actual_addr.to_string(), shutdown_tx);
        debug!(address = %actual_addr, "Federation server started");
        Ok(())
    }

    async fn stop_server(&self) -> Result<()> {
        let mut server_state = self.server_state.lock().await;
        if !server_state.is_running() {
            return Err(TransportError::ServerNotRunning.into());
        }
        server_state.stop_server();
        Ok(())
    }

    fn is_server_running(&self) -> bool {
        self.server_state
            .try_lock()
            .map(|state| state.is_running())
            .unwrap_or(false)
    }

    fn server_address(&self) -> Result<String> {
        self.server_state
            .try_lock()
            .map_err(|_| TransportError::ServerNotRunning)?
            .address()
            .map_err(Into::into)
    }

    async fn send_request(&self, base_url: &str, request: RestRequest) -> Result<RestResponse> {
        match &request {
            RestRequest::Hello => self.fetch_hello(base_url).await.map(RestResponse::Hello),
            RestRequest::FriendRequest(message) => Ok(self
                .post_json(base_url, "friend-request", message)
                .await?
                .map(RestResponse::FriendRequest)
                .unwrap_or_else(RestResponse::Error)),
            RestRequest::AcceptFriendRequest(message) => Ok(self
                .post_json(base_url, "accept-friend-request", message)
                .await?
                .map(RestResponse::AcceptFriendRequest)
                .unwrap_or_else(RestResponse::Error)),
            RestRequest::PostDeleted(notice) => Ok(self
                .post_json(base_url, "post-deleted", notice)
                .await?
                .map(RestResponse::PostDeleted)
                .unwrap_or_else(RestResponse::Error)),
            RestRequest::Message(message) => Ok(self
                .post_json(base_url, "message", message)
                .await?
                .map(RestResponse::Message)
                .unwrap_or_else(RestResponse::Error)),
        }
    }

    async fn fetch_hello(&self, base_url: &str) -> Result<Hello> {
        let url = Self::endpoint_url(base_url, "hello");
        let response = self.client.get(&url).send().await.map_err(|e| {
            TransportError::ConnectionFailed {
                address: base_url.to_string(),
                reason: e.to_string(),
            }
        })?;
        match Self::parse_response::<Hello>(&url, response).await? {
            Ok(hello) => Ok(hello),
            Err(body) => Err(TransportError::Network(format!(
                "Hello endpoint returned error: {}",
                body.message
            ))
            .into()),
        }
    }
}

// === Axum endpoint handlers ===

async fn handle_hello(State(handler): State<Arc<dyn RequestHandler>>) -> Response {
    respond(handler.handle_request(RestRequest::Hello).await)
}

async fn handle_friend_request(
    State(handler): State<Arc<dyn RequestHandler>>,
    Json(message): Json<FriendRequestMessage>,
) -> Response {
    respond(
        handler
            .handle_request(RestRequest::FriendRequest(message))
            .await,
    )
}

async fn handle_accept_friend_request(
    State(handler): State<Arc<dyn RequestHandler>>,
    Json(message): Json<AcceptMessage>,
) -> Response {
    respond(
        handler
            .handle_request(RestRequest::AcceptFriendRequest(message))
            .await,
    )
}

async fn handle_post_deleted(
    State(handler): State<Arc<dyn RequestHandler>>,
    Json(notice): Json<PostDeletedNotice>,
) -> Response {
    respond(handler.handle_request(RestRequest::PostDeleted(notice)).await)
}

async fn handle_message(
    State(handler): State<Arc<dyn RequestHandler>>,
    Json(message): Json<RemoteMessage>,
) -> Response {
    respond(handler.handle_request(RestRequest::Message(message)).await)
}

/// Map a handler response onto the wire: plain JSON payloads for
/// successes, HTTP 403 with the structured body for failures.
fn respond(response: RestResponse) -> Response {
    match response {
        RestResponse::Hello(hello) => Json(hello).into_response(),
        RestResponse::FriendRequest(accepted) => Json(accepted).into_response(),
        RestResponse::AcceptFriendRequest(confirmation) => Json(confirmation).into_response(),
        RestResponse::PostDeleted(ack) => Json(ack).into_response(),
        RestResponse::Message(ack) => Json(ack).into_response(),
        RestResponse::Error(body) => (StatusCode::FORBIDDEN, Json(body)).into_response(),
    }
}
