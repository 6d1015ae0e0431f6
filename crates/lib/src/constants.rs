//! Crate-wide constants.

/// Version of the federation wire protocol spoken by this node.
pub const PROTOCOL_VERSION: u32 = 2;

/// REST namespace all federation endpoints live under.
pub const REST_NAMESPACE: &str = "friends/v1";

/// Default validity window for bearer proofs, in seconds.
pub const DEFAULT_AUTH_VALIDITY_SECS: i64 = 3600;

/// Timeout for outbound peer requests, in seconds.
pub const PEER_REQUEST_TIMEOUT_SECS: u64 = 20;

/// Maximum number of redirects followed on outbound peer requests.
pub const PEER_REQUEST_MAX_REDIRECTS: usize = 5;

/// Number of random bytes in a generated token (hex-encoded on the wire).
pub const TOKEN_BYTES: usize = 32;

/// Minimum accepted length for a peer-supplied key.
pub const MIN_KEY_LENGTH: usize = 16;
