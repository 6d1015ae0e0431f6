//! Wire protocol for the federation REST endpoints.
//!
//! Transport-agnostic message types. Each endpoint exchanges a plain JSON
//! object; [`RestRequest`]/[`RestResponse`] exist so handlers and
//! transports can route without caring which endpoint a message belongs
//! to.

use serde::{Deserialize, Serialize};

/// Discovery response advertising protocol version and canonical URL.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Hello {
    pub version: u32,
    pub site_url: String,
}

/// Step 1: a remote site asks to become a friend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FriendRequestMessage {
    /// Protocol version spoken by the requester
    pub version: u32,
    /// Shared codeword, when the receiving site requires one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codeword: Option<String>,
    /// Canonical URL of the requesting site
    pub url: String,
    /// Candidate token: the requester's future in-token, our future
    /// out-token
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
    /// Free-form message shown to the receiving operator
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Step 1 response: the request was recorded under this ID.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FriendRequestAccepted {
    pub request: String,
}

/// Step 2: the receiving site's operator accepted; prove it and propose
/// the second token half.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcceptMessage {
    /// The request ID from step 1
    pub request: String,
    /// `hash(key_from_step_1 || request_id)`
    pub proof: String,
    /// Candidate token: the acceptor's future in-token
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_url: Option<String>,
}

/// Step 3 response: `hash(key_from_step_2 || key_from_step_1)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AcceptConfirmation {
    pub signature: String,
}

/// Tombstone notice for a post deleted on the sender's site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostDeletedNotice {
    /// The post's ID on the sender's site
    pub post_id: u64,
    /// Combined bearer proof (`<token>-<until>-<auth>`)
    pub auth: String,
}

/// Tombstone acknowledgment. `deleted: false` is the normal silent no-op
/// for posts never mirrored locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostDeletedAck {
    pub deleted: bool,
}

/// A private message from one site operator to another.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemoteMessage {
    pub subject: String,
    pub message: String,
    /// Combined bearer proof (`<token>-<until>-<auth>`)
    pub auth: String,
}

/// Message receipt acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageAck {
    pub status: String,
}

/// Status value confirming message receipt.
pub const MESSAGE_RECEIVED: &str = "message-received";

/// Machine-readable error codes returned with HTTP 403.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    UnsupportedProtocolVersion,
    InvalidCodeword,
    InvalidSite,
    InvalidKey,
    InvalidParameters,
    InvalidProof,
    OfferNoLongerValid,
    RequestFailed,
}

impl ErrorCode {
    /// Stable wire string for this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnsupportedProtocolVersion => "unsupported_protocol_version",
            ErrorCode::InvalidCodeword => "invalid_codeword",
            ErrorCode::InvalidSite => "invalid_site",
            ErrorCode::InvalidKey => "invalid_key",
            ErrorCode::InvalidParameters => "invalid_parameters",
            ErrorCode::InvalidProof => "invalid_proof",
            ErrorCode::OfferNoLongerValid => "offer_no_longer_valid",
            ErrorCode::RequestFailed => "request_failed",
        }
    }
}

/// Structured error payload for the initiating operator's UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

/// A request to any of the federation endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum RestRequest {
    Hello,
    FriendRequest(FriendRequestMessage),
    AcceptFriendRequest(AcceptMessage),
    PostDeleted(PostDeletedNotice),
    Message(RemoteMessage),
}

/// A response from any of the federation endpoints.
#[derive(Debug, Clone, PartialEq)]
pub enum RestResponse {
    Hello(Hello),
    FriendRequest(FriendRequestAccepted),
    AcceptFriendRequest(AcceptConfirmation),
    PostDeleted(PostDeletedAck),
    Message(MessageAck),
    Error(ErrorBody),
}
