//! Transport abstractions for federation communication.
//!
//! The [`Transport`] trait separates the wire protocol from how bytes
//! move. The HTTP implementation is the one peers actually speak; the
//! trait keeps handlers and the handshake driver testable against it.

pub mod http;
pub mod shared;

pub use http::HttpTransport;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    Result,
    handshake::{
        RequestHandler,
        protocol::{Hello, RestRequest, RestResponse},
    },
};

/// Errors that can occur in transports.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TransportError {
    /// Attempted to start a server when one is already running.
    #[error("Server already running on {address}")]
    ServerAlreadyRunning { address: String },

    /// Attempted to stop a server when none is running.
    #[error("Server not running")]
    ServerNotRunning,

    /// Server bind error.
    #[error("Failed to bind server to {address}: {reason}")]
    ServerBind { address: String, reason: String },

    /// Client connection error.
    #[error("Failed to connect to {address}: {reason}")]
    ConnectionFailed { address: String, reason: String },

    /// Network communication error.
    #[error("Network error: {0}")]
    Network(String),

    /// HTTP client initialization error.
    #[error("Failed to initialize transport client: {0}")]
    ClientInit(String),
}

impl TransportError {
    /// Check if this is a server lifecycle error.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            TransportError::ServerAlreadyRunning { .. }
                | TransportError::ServerNotRunning
                | TransportError::ServerBind { .. }
        )
    }

    /// Check if this is a network/connection error.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            TransportError::Network(_) | TransportError::ConnectionFailed { .. }
        )
    }
}

/// Trait for federation communication over a concrete wire.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Start a server on the given address (port 0 picks a free port),
    /// dispatching inbound requests to the handler.
    async fn start_server(&self, addr: &str, handler: Arc<dyn RequestHandler>) -> Result<()>;

    /// Stop the running server gracefully.
    async fn stop_server(&self) -> Result<()>;

    /// Check if the server is currently running.
    fn is_server_running(&self) -> bool;

    /// The address the server is bound to. Useful after binding port 0.
    fn server_address(&self) -> Result<String>;

    /// Send a request to a peer site identified by its base URL.
    async fn send_request(&self, base_url: &str, request: RestRequest) -> Result<RestResponse>;

    /// Probe a peer's discovery endpoint.
    async fn fetch_hello(&self, base_url: &str) -> Result<Hello>;
}
