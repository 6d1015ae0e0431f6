//!
//! Amity: federated friendships for self-hosted sites.
//!
//! A node of a small federated social network: operators exchange friend
//! requests with other nodes, subscribe to feeds as virtual
//! "subscription" identities, receive private messages, and serve an
//! authenticated feed to friends.
//!
//! ## Core Concepts
//!
//! * **Identities (`identity`)**: remote parties as real local accounts
//!   or lightweight virtual subscriptions, with a closed role set and an
//!   explicit transition table.
//! * **Access control (`auth`)**: rotating per-friendship token pairs and
//!   the time-boxed bearer proofs derived from them; request-scoped
//!   memoization; capability checks.
//! * **Handshake (`handshake`)**: the multi-step REST exchange that
//!   establishes a token pair between two independently operated sites.
//! * **Transports (`transport`)**: the HTTP server/client pair speaking
//!   the federation protocol.
//! * **Backend (`backend`)**: the narrow persistence interface the core
//!   stores identities, options, posts, and messages through.
//! * **Node (`node`)**: the facade tying one site's components together.

pub mod auth;
pub mod backend;
pub mod constants;
pub mod handshake;
pub mod identity;
pub mod node;
pub mod transport;

pub use node::{Node, NodeConfig};

/// Result type used throughout the Amity library.
pub type Result<T> = std::result::Result<T, Error>;

/// Common error type for the Amity library.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Structured storage errors from the backend module
    #[error(transparent)]
    Backend(#[from] backend::BackendError),

    /// Structured identity-model errors from the identity module
    #[error(transparent)]
    Identity(#[from] identity::IdentityError),

    /// Structured token/access errors from the auth module
    #[error(transparent)]
    Auth(#[from] auth::AuthError),

    /// Structured protocol errors from the handshake module
    #[error(transparent)]
    Handshake(#[from] handshake::HandshakeError),

    /// Structured network errors from the transport module
    #[error(transparent)]
    Transport(#[from] transport::TransportError),
}

impl Error {
    /// Get the originating module for this error.
    pub fn module(&self) -> &'static str {
        match self {
            Error::Io(_) => "io",
            Error::Serialize(_) => "serialize",
            Error::Backend(_) => "backend",
            Error::Identity(_) => "identity",
            Error::Auth(_) => "auth",
            Error::Handshake(_) => "handshake",
            Error::Transport(_) => "transport",
        }
    }

    /// Check if this error indicates a resource was not found.
    pub fn is_not_found(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_not_found(),
            Error::Identity(identity_err) => identity_err.is_not_found(),
            _ => false,
        }
    }

    /// Check if this error indicates a conflict (already exists).
    pub fn is_conflict(&self) -> bool {
        match self {
            Error::Backend(backend_err) => backend_err.is_already_exists(),
            Error::Identity(identity_err) => identity_err.is_already_exists(),
            _ => false,
        }
    }

    /// Check if this error is a protocol-level handshake rejection.
    pub fn is_protocol_error(&self) -> bool {
        match self {
            Error::Handshake(handshake_err) => handshake_err.is_protocol_error(),
            _ => false,
        }
    }

    /// Check if this error is a handshake state error (out-of-order or
    /// replayed step).
    pub fn is_state_error(&self) -> bool {
        match self {
            Error::Handshake(handshake_err) => handshake_err.is_state_error(),
            _ => false,
        }
    }

    /// Check if this error is network-related.
    pub fn is_network_error(&self) -> bool {
        match self {
            Error::Transport(transport_err) => transport_err.is_network_error(),
            _ => false,
        }
    }

    /// Check if this error is a role/transition validation failure.
    pub fn is_role_error(&self) -> bool {
        match self {
            Error::Identity(identity_err) => identity_err.is_role_error(),
            _ => false,
        }
    }
}
