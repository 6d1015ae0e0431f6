//! Bearer proofs and token generation.
//!
//! A bearer proof demonstrates possession of a shared secret without
//! transmitting it: the wire carries `hex(sha256(until || secret))`
//! together with the `until` deadline. Tokens themselves are long-lived;
//! only proofs expire.

use rand::{Rng, rngs::OsRng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::constants::TOKEN_BYTES;

/// Compute the proof hash for a deadline and secret.
pub fn hash_proof(until: i64, secret: &str) -> String {
    hash_pair(&until.to_string(), secret)
}

/// Hash the concatenation of two strings.
///
/// Used for handshake proofs and signatures (`hash(key || request_id)`,
/// `hash(key_a || key_b)`).
pub fn hash_pair(a: &str, b: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(a.as_bytes());
    hasher.update(b.as_bytes());
    hex::encode(hasher.finalize())
}

/// Hash a single value. Used to key handshake state by request ID.
pub fn hash_value(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Generate a new high-entropy token, hex-encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill(&mut bytes[..]);
    hex::encode(bytes)
}

/// Query parameters an authenticated feed/page request can carry.
///
/// Two shapes are accepted: `friend` (the raw token) or `me` (the
/// canonical-URL-derived login), each with `until`/`auth`. The legacy
/// `friend_auth` combined forms are folded into these fields at parse
/// time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedQuery {
    pub me: Option<String>,
    pub friend: Option<String>,
    pub until: Option<i64>,
    pub auth: Option<String>,
}

impl FeedQuery {
    /// Parse a URL query string.
    ///
    /// Recognized legacy combined forms:
    /// `friend_auth=<token>-<until>-<auth>` and
    /// `friend_auth=<until>-<auth>` next to a separate `me` parameter.
    pub fn parse(query: &str) -> Self {
        let mut parsed = Self::default();
        let mut friend_auth = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "me" => parsed.me = Some(value.into_owned()),
                "friend" => parsed.friend = Some(value.into_owned()),
                "until" => parsed.until = value.parse().ok(),
                "auth" => parsed.auth = Some(value.into_owned()),
                "friend_auth" => friend_auth = Some(value.into_owned()),
                _ => {}
            }
        }
        if let Some(combined) = friend_auth {
            parsed.apply_combined(&combined);
        }
        parsed
    }

    fn apply_combined(&mut self, combined: &str) {
        let parts: Vec<&str> = combined.split('-').collect();
        match parts.as_slice() {
            [token, until, auth] => {
                self.friend = Some(token.to_string());
                self.until = until.parse().ok();
                self.auth = Some(auth.to_string());
            }
            [until, auth] if self.me.is_some() => {
                self.until = until.parse().ok();
                self.auth = Some(auth.to_string());
            }
            _ => {}
        }
    }
}

/// A computed bearer proof ready to be appended to a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FriendAuth {
    /// Our login as the remote site knows us
    pub me: String,
    /// Proof deadline (Unix seconds)
    pub until: i64,
    /// Proof hash
    pub auth: String,
}

/// Format a self-contained combined proof (`<token>-<until>-<auth>`).
pub fn format_combined(token: &str, until: i64, auth: &str) -> String {
    format!("{token}-{until}-{auth}")
}

/// Parse a combined proof into its `(token, until, auth)` parts.
pub fn parse_combined(combined: &str) -> Option<(String, i64, String)> {
    let parts: Vec<&str> = combined.split('-').collect();
    match parts.as_slice() {
        [token, until, auth] => {
            let until = until.parse().ok()?;
            Some((token.to_string(), until, auth.to_string()))
        }
        _ => None,
    }
}
