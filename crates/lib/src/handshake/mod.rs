//! The friendship handshake: establishing mutual trust between two sites.
//!
//! Trust is a pair of long-lived bearer tokens negotiated over three REST
//! exchanges: the initiator proposes one half with its friend request,
//! the acceptor proposes the other half together with a proof of the
//! first, and the initiator's confirmation signature lets the acceptor
//! commit. Every exchange is keyed by a single-use request ID; completed
//! or replayed steps are rejected, never re-processed.
//!
//! This module holds the client side (steps 1, 2, and 4); the receiver
//! side lives in [`handler`].

pub mod handler;
pub mod protocol;

mod errors;

pub use errors::HandshakeError;
pub use handler::RequestHandler;

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    Result,
    auth::{AccessControl, generate_token, hash_pair, hash_value},
    constants::PROTOCOL_VERSION,
    identity::{Backing, Identities, Identity, IdentityRef, NewIdentity, Role},
    transport::Transport,
};

use self::protocol::{
    AcceptMessage, FriendRequestMessage, MESSAGE_RECEIVED, PostDeletedNotice, RemoteMessage,
    RestRequest, RestResponse,
};

/// This site's public profile, as presented to peers.
#[derive(Debug, Clone)]
pub struct SiteInfo {
    /// Normalized canonical URL of this site
    pub url: String,
    /// Display name sent with handshake messages
    pub display_name: Option<String>,
    /// Icon sent with handshake messages
    pub icon_url: Option<String>,
    /// Codeword required from inbound friend requests
    pub required_codeword: Option<String>,
    /// Whether inbound friend requests are verified by probing the
    /// requesting site's hello endpoint
    pub probe_requester: bool,
}

/// Handshake protocol driver.
pub struct Handshake {
    site: SiteInfo,
    identities: Arc<Identities>,
    access: Arc<AccessControl>,
    transport: Arc<dyn Transport>,
}

impl Handshake {
    /// Create a handshake driver.
    pub fn new(
        site: SiteInfo,
        identities: Arc<Identities>,
        access: Arc<AccessControl>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            site,
            identities,
            access,
            transport,
        }
    }

    /// This site's profile.
    pub fn site(&self) -> &SiteInfo {
        &self.site
    }

    /// Step 1: send a friend request to a remote site.
    ///
    /// Generates the first candidate token, records the returned request
    /// ID under the identity, and leaves it in `PendingFriendRequest`.
    /// Network failures leave local state pending; the operator
    /// re-triggers by sending again.
    pub async fn send_friend_request(
        &self,
        url: &str,
        message: Option<String>,
        codeword: Option<String>,
    ) -> Result<Identity> {
        let peer_url = crate::identity::normalize_site_url(url)?;
        if peer_url == self.site.url {
            return Err(HandshakeError::InvalidSite { url: peer_url }.into());
        }

        let hello = self.transport.fetch_hello(&peer_url).await?;
        if hello.version != PROTOCOL_VERSION {
            return Err(HandshakeError::UnsupportedProtocolVersion {
                expected: PROTOCOL_VERSION,
                received: hello.version,
            }
            .into());
        }

        let identity = self.prepare_outgoing_identity(&peer_url)?;

        let key = generate_token();
        let request = FriendRequestMessage {
            version: PROTOCOL_VERSION,
            codeword,
            url: self.site.url.clone(),
            key: key.clone(),
            name: self.site.display_name.clone(),
            icon_url: self.site.icon_url.clone(),
            message,
        };

        let response = self
            .transport
            .send_request(&peer_url, RestRequest::FriendRequest(request))
            .await?;
        let accepted = match response {
            RestResponse::FriendRequest(accepted) => accepted,
            RestResponse::Error(body) => return Err(HandshakeError::from_body(body).into()),
            _ => {
                return Err(HandshakeError::UnexpectedResponse {
                    expected: "FriendRequest",
                }
                .into());
            }
        };

        // Thread our candidate token through to the accept handler: it
        // is only retrievable by the hashed request ID the peer issued.
        let request_hash = hash_value(&accepted.request);
        self.access.store_future_in_token(&request_hash, &key)?;
        self.access.set_request_id(identity.id, &request_hash)?;

        info!(peer = %peer_url, id = %identity.id, "Friend request sent");
        Ok(identity)
    }

    /// Resolve or create the local identity for an outgoing request.
    fn prepare_outgoing_identity(&self, peer_url: &str) -> Result<Identity> {
        match self.identities.find_by_url(peer_url)? {
            Some(existing) => match existing.role {
                Role::Friend | Role::Acquaintance => Err(HandshakeError::AlreadyFriends {
                    url: peer_url.to_string(),
                }
                .into()),
                Role::FriendRequest => Err(HandshakeError::IncomingRequestPending {
                    url: peer_url.to_string(),
                }
                .into()),
                Role::PendingFriendRequest => Ok(existing),
                Role::Subscription => {
                    // Trust-bearing tokens will be issued on completion;
                    // promote the subscription to a real account first.
                    let promoted = if existing.id.is_term() {
                        self.identities.convert_to_user(existing.id)?
                    } else {
                        existing
                    };
                    self.identities
                        .set_role(promoted.id, Role::PendingFriendRequest)
                }
            },
            None => self.identities.create(NewIdentity {
                login: Identities::login_for_url(peer_url)?,
                role: Role::PendingFriendRequest,
                url: peer_url.to_string(),
                display_name: peer_url
                    .trim_start_matches("https://")
                    .trim_start_matches("http://")
                    .to_string(),
                icon_url: None,
                description: None,
                backing: Backing::User,
            }),
        }
    }

    /// Steps 2 and 4: notify the requester that their friend request was
    /// accepted, then verify its confirmation signature.
    ///
    /// Called after the operator transitions the identity into a friend
    /// role. When the identity has no stored handshake state (a purely
    /// local role change), this is a no-op.
    pub async fn notify_accepted(&self, id: IdentityRef) -> Result<()> {
        let identity = self.identities.get(id)?;
        let (Some(their_key), Some(request_id)) = (
            self.access.future_out_token(id)?,
            self.access.request_id(id)?,
        ) else {
            debug!(id = %id, "No handshake state, skipping accept notification");
            return Ok(());
        };

        let our_key = generate_token();
        self.access.set_future_in_token(id, &our_key)?;

        let message = AcceptMessage {
            request: request_id.clone(),
            proof: hash_pair(&their_key, &request_id),
            key: our_key.clone(),
            name: self.site.display_name.clone(),
            icon_url: self.site.icon_url.clone(),
        };

        let response = match self
            .transport
            .send_request(&identity.url, RestRequest::AcceptFriendRequest(message))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // Leave local state as it was before this step.
                self.access.delete_future_in_token(id)?;
                return Err(e);
            }
        };

        let confirmation = match response {
            RestResponse::AcceptFriendRequest(confirmation) => confirmation,
            RestResponse::Error(body) => {
                self.access.delete_future_in_token(id)?;
                return Err(HandshakeError::from_body(body).into());
            }
            _ => {
                self.access.delete_future_in_token(id)?;
                return Err(HandshakeError::UnexpectedResponse {
                    expected: "AcceptFriendRequest",
                }
                .into());
            }
        };

        self.finalize_acceptance(id, &our_key, &their_key, &confirmation.signature)
    }

    /// Step 4: check the confirmation signature and commit or roll back.
    ///
    /// On a matching signature the token pair is committed and ephemeral
    /// handshake state cleared. On a mismatch the identity's role is
    /// rolled back to `FriendRequest` so the failed acceptance is visible
    /// to the operator.
    pub fn finalize_acceptance(
        &self,
        id: IdentityRef,
        our_key: &str,
        their_key: &str,
        signature: &str,
    ) -> Result<()> {
        let expected = hash_pair(our_key, their_key);
        if signature != expected {
            warn!(id = %id, "Acceptance signature mismatch, rolling back role");
            self.access.delete_future_in_token(id)?;
            self.identities.set_role(id, Role::FriendRequest)?;
            return Err(HandshakeError::InvalidSignature.into());
        }

        self.access.make_friend(id, our_key, their_key)?;
        info!(id = %id, "Friendship established");
        Ok(())
    }

    /// Notify every friend that a local post was deleted.
    ///
    /// Failures are logged per peer and do not stop delivery to the
    /// rest; no automatic retries. Returns the number of peers that
    /// confirmed deleting their copy.
    pub async fn notify_friends_post_deleted(&self, post_id: u64) -> Result<usize> {
        let mut deleted = 0;
        for friend in self.identities.all_friends()? {
            let Some(auth) = self.access.combined_auth(friend.id)? else {
                debug!(id = %friend.id, "Friend has no token pair, skipping tombstone");
                continue;
            };
            let notice = PostDeletedNotice { post_id, auth };
            match self
                .transport
                .send_request(&friend.url, RestRequest::PostDeleted(notice))
                .await
            {
                Ok(RestResponse::PostDeleted(ack)) => {
                    if ack.deleted {
                        deleted += 1;
                    }
                }
                Ok(other) => {
                    warn!(id = %friend.id, response = ?other, "Unexpected tombstone response")
                }
                Err(e) => warn!(id = %friend.id, error = %e, "Failed to deliver tombstone"),
            }
        }
        Ok(deleted)
    }

    /// Send a private message to a friend.
    pub async fn send_message(
        &self,
        id: IdentityRef,
        subject: &str,
        message: &str,
    ) -> Result<()> {
        let identity = self.identities.get(id)?;
        let auth = self
            .access
            .combined_auth(id)?
            .ok_or(crate::auth::AuthError::NoTokenPair(id))?;

        let request = RemoteMessage {
            subject: subject.to_string(),
            message: message.to_string(),
            auth,
        };
        let response = self
            .transport
            .send_request(&identity.url, RestRequest::Message(request))
            .await?;
        match response {
            RestResponse::Message(ack) if ack.status == MESSAGE_RECEIVED => Ok(()),
            RestResponse::Message(_) => Err(HandshakeError::UnexpectedResponse {
                expected: "message-received status",
            }
            .into()),
            RestResponse::Error(body) => Err(HandshakeError::from_body(body).into()),
            _ => Err(HandshakeError::UnexpectedResponse { expected: "Message" }.into()),
        }
    }

    pub(crate) fn identities(&self) -> &Arc<Identities> {
        &self.identities
    }

    pub(crate) fn access(&self) -> &Arc<AccessControl> {
        &self.access
    }

    pub(crate) fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}
