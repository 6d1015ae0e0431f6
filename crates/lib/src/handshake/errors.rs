//! Error types for the handshake protocol.

use thiserror::Error;

use super::protocol::{ErrorBody, ErrorCode};

/// Errors that can occur while establishing or servicing a friendship.
///
/// Variants carrying a wire code are returned to the remote peer as HTTP
/// 403 with a structured body; the rest surface to the local operator.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HandshakeError {
    /// The peer speaks a different protocol version.
    #[error("Unsupported protocol version: expected {expected}, received {received}")]
    UnsupportedProtocolVersion { expected: u32, received: u32 },

    /// The site requires a codeword and it was missing or wrong.
    #[error("Invalid codeword")]
    InvalidCodeword,

    /// The requesting site URL is malformed, unreachable, or our own.
    #[error("Invalid site: {url}")]
    InvalidSite { url: String },

    /// The proposed key is missing or too short.
    #[error("Invalid key")]
    InvalidKey,

    /// No handshake state matches the presented request ID.
    #[error("Invalid parameters")]
    InvalidParameters,

    /// The acceptance proof does not match the stored candidate token.
    #[error("Invalid proof")]
    InvalidProof,

    /// The identity is no longer awaiting this handshake step.
    #[error("Offer no longer valid")]
    OfferNoLongerValid,

    /// The final signature did not verify; the acceptance was rolled
    /// back.
    #[error("Signature verification failed, friendship rolled back")]
    InvalidSignature,

    /// The identity is already a friend.
    #[error("Already friends with {url}")]
    AlreadyFriends { url: String },

    /// The remote site already has a request pending with us; accept it
    /// instead of sending a new one.
    #[error("Incoming friend request from {url} is pending; accept it instead")]
    IncomingRequestPending { url: String },

    /// The peer rejected the request with a structured error.
    #[error("Peer rejected request: {code} ({message})")]
    PeerRejected { code: String, message: String },

    /// The request could not be serviced.
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// The peer answered with a different message type than the step
    /// expects.
    #[error("Unexpected response type: expected {expected}")]
    UnexpectedResponse { expected: &'static str },
}

impl HandshakeError {
    /// The wire code for this error, when it has one.
    pub fn wire_code(&self) -> Option<ErrorCode> {
        match self {
            HandshakeError::UnsupportedProtocolVersion { .. } => {
                Some(ErrorCode::UnsupportedProtocolVersion)
            }
            HandshakeError::InvalidCodeword => Some(ErrorCode::InvalidCodeword),
            HandshakeError::InvalidSite { .. } => Some(ErrorCode::InvalidSite),
            HandshakeError::InvalidKey => Some(ErrorCode::InvalidKey),
            HandshakeError::InvalidParameters => Some(ErrorCode::InvalidParameters),
            HandshakeError::InvalidProof => Some(ErrorCode::InvalidProof),
            HandshakeError::OfferNoLongerValid => Some(ErrorCode::OfferNoLongerValid),
            HandshakeError::RequestFailed(_) => Some(ErrorCode::RequestFailed),
            _ => None,
        }
    }

    /// Convert to the structured wire payload.
    pub fn to_body(&self) -> ErrorBody {
        ErrorBody {
            code: self.wire_code().unwrap_or(ErrorCode::RequestFailed),
            message: self.to_string(),
        }
    }

    /// Wrap a peer's structured error payload for the local operator.
    pub fn from_body(body: ErrorBody) -> Self {
        HandshakeError::PeerRejected {
            code: body.code.as_str().to_string(),
            message: body.message,
        }
    }

    /// Check if this is a protocol-level rejection (version, codeword,
    /// site, key).
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            HandshakeError::UnsupportedProtocolVersion { .. }
                | HandshakeError::InvalidCodeword
                | HandshakeError::InvalidSite { .. }
                | HandshakeError::InvalidKey
        )
    }

    /// Check if this is a handshake state error (out-of-order or replayed
    /// step).
    pub fn is_state_error(&self) -> bool {
        matches!(
            self,
            HandshakeError::InvalidParameters
                | HandshakeError::OfferNoLongerValid
                | HandshakeError::InvalidProof
                | HandshakeError::InvalidSignature
        )
    }
}
