//! Receiver side of the federation endpoints.
//!
//! Transport-agnostic request handling: transports parse wire payloads
//! into [`RestRequest`] values and hand them here. Handshake failures map
//! to structured 403 bodies; internal failures are logged and degraded to
//! a generic `request_failed` so storage details never cross the wire.

use async_trait::async_trait;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::{
    Handshake, HandshakeError,
    protocol::{
        AcceptConfirmation, AcceptMessage, ErrorBody, FriendRequestAccepted, FriendRequestMessage,
        Hello, MESSAGE_RECEIVED, MessageAck, PostDeletedAck, PostDeletedNotice, RemoteMessage,
        RestRequest, RestResponse,
    },
};
use crate::{
    Error, Result,
    auth::{hash_pair, hash_value},
    backend::{MessageRecord, PostStatus},
    constants::{MIN_KEY_LENGTH, PROTOCOL_VERSION},
    identity::{Backing, Identities, NewIdentity, Role, UserQuery},
};

/// Processes inbound federation requests, regardless of transport.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle a request and produce the response to send back.
    async fn handle_request(&self, request: RestRequest) -> RestResponse;
}

#[async_trait]
impl RequestHandler for Handshake {
    async fn handle_request(&self, request: RestRequest) -> RestResponse {
        let result = match request {
            RestRequest::Hello => Ok(RestResponse::Hello(self.handle_hello())),
            RestRequest::FriendRequest(message) => self
                .handle_friend_request(message)
                .await
                .map(RestResponse::FriendRequest),
            RestRequest::AcceptFriendRequest(message) => self
                .handle_accept(message)
                .map(RestResponse::AcceptFriendRequest),
            RestRequest::PostDeleted(notice) => {
                self.handle_post_deleted(notice).map(RestResponse::PostDeleted)
            }
            RestRequest::Message(message) => {
                self.handle_message(message).map(RestResponse::Message)
            }
        };
        result.unwrap_or_else(|e| RestResponse::Error(error_body(e)))
    }
}

/// Map an internal error to the structured wire payload.
fn error_body(e: Error) -> ErrorBody {
    match e {
        Error::Handshake(handshake_error) => handshake_error.to_body(),
        other => {
            error!(error = %other, "Internal error handling federation request");
            HandshakeError::RequestFailed("Could not process request".to_string()).to_body()
        }
    }
}

impl Handshake {
    fn handle_hello(&self) -> Hello {
        Hello {
            version: PROTOCOL_VERSION,
            site_url: self.site().url.clone(),
        }
    }

    /// Step 1, receiver side: record an inbound friend request.
    async fn handle_friend_request(
        &self,
        message: FriendRequestMessage,
    ) -> Result<FriendRequestAccepted> {
        if message.version != PROTOCOL_VERSION {
            return Err(HandshakeError::UnsupportedProtocolVersion {
                expected: PROTOCOL_VERSION,
                received: message.version,
            }
            .into());
        }
        if let Some(required) = &self.site().required_codeword
            && message.codeword.as_deref() != Some(required.as_str())
        {
            return Err(HandshakeError::InvalidCodeword.into());
        }
        if message.key.len() < MIN_KEY_LENGTH {
            return Err(HandshakeError::InvalidKey.into());
        }

        let peer_url = crate::identity::normalize_site_url(&message.url).map_err(|_| {
            HandshakeError::InvalidSite {
                url: message.url.clone(),
            }
        })?;
        if peer_url == self.site().url {
            // Self-friending is always a mistake.
            return Err(HandshakeError::InvalidSite { url: peer_url }.into());
        }
        if self.site().probe_requester {
            self.transport()
                .fetch_hello(&peer_url)
                .await
                .map_err(|_| HandshakeError::InvalidSite {
                    url: peer_url.clone(),
                })?;
        }

        let identity = self.prepare_incoming_identity(&peer_url, &message)?;

        let request_id = Uuid::new_v4().simple().to_string();
        self.access().set_future_out_token(identity.id, &message.key)?;
        self.access().set_request_id(identity.id, &request_id)?;

        info!(peer = %peer_url, id = %identity.id, "Recorded friend request");
        Ok(FriendRequestAccepted {
            request: request_id,
        })
    }

    /// Resolve or create the local identity for an inbound request.
    fn prepare_incoming_identity(
        &self,
        peer_url: &str,
        message: &FriendRequestMessage,
    ) -> Result<crate::identity::Identity> {
        let identities = self.identities();
        match identities.find_by_url(peer_url)? {
            Some(existing) => {
                let identity = if existing.id.is_term() {
                    // The request's tokens need a real account to attach
                    // to once accepted.
                    identities.convert_to_user(existing.id)?
                } else {
                    existing
                };
                identities.update_profile(
                    identity.id,
                    message.name.as_deref(),
                    message.icon_url.as_deref(),
                )?;
                // An identity we are already requesting stays pending;
                // everything else becomes an incoming request.
                if identity.role == Role::PendingFriendRequest {
                    Ok(identity)
                } else {
                    identities.set_role(identity.id, Role::FriendRequest)
                }
            }
            None => identities.create(NewIdentity {
                login: Identities::login_for_url(peer_url)?,
                role: Role::FriendRequest,
                url: peer_url.to_string(),
                display_name: message
                    .name
                    .clone()
                    .unwrap_or_else(|| peer_url.to_string()),
                icon_url: message.icon_url.clone(),
                description: message.message.clone(),
                backing: Backing::User,
            }),
        }
    }

    /// Step 3: validate the acceptor's proof, commit our token pair, and
    /// return the confirmation signature.
    fn handle_accept(&self, message: AcceptMessage) -> Result<AcceptConfirmation> {
        if message.key.len() < MIN_KEY_LENGTH {
            return Err(HandshakeError::InvalidKey.into());
        }

        let request_hash = hash_value(&message.request);
        let Some(our_key) = self.access().stored_future_in_token(&request_hash)? else {
            return Err(HandshakeError::InvalidParameters.into());
        };
        if message.proof != hash_pair(&our_key, &message.request) {
            return Err(HandshakeError::InvalidProof.into());
        }
        if message.key == our_key {
            return Err(HandshakeError::InvalidKey.into());
        }

        let Some(identity) = self.find_request_identity(&request_hash)? else {
            return Err(HandshakeError::InvalidParameters.into());
        };
        if identity.role != Role::PendingFriendRequest {
            return Err(HandshakeError::OfferNoLongerValid.into());
        }

        self.access().make_friend(identity.id, &our_key, &message.key)?;
        self.identities().update_profile(
            identity.id,
            message.name.as_deref(),
            message.icon_url.as_deref(),
        )?;
        self.identities().set_role(identity.id, Role::Friend)?;
        // Consuming the record is what makes a replay of this step fail.
        self.access().consume_future_in_token(&request_hash)?;

        info!(id = %identity.id, "Friend request accepted by peer");
        Ok(AcceptConfirmation {
            signature: hash_pair(&message.key, &our_key),
        })
    }

    /// Find the identity whose outgoing request matches a hashed request
    /// ID, whatever role it holds now.
    fn find_request_identity(
        &self,
        request_hash: &str,
    ) -> Result<Option<crate::identity::Identity>> {
        for identity in self.identities().query(&UserQuery::new())? {
            if self.access().request_id(identity.id)?.as_deref() == Some(request_hash) {
                return Ok(Some(identity));
            }
        }
        Ok(None)
    }

    /// Delete our mirrored copy of a post the author deleted.
    fn handle_post_deleted(&self, notice: PostDeletedNotice) -> Result<PostDeletedAck> {
        let Some(caller) = self.access().verify_combined(&notice.auth)? else {
            return Err(
                HandshakeError::RequestFailed("Could not authenticate request".to_string()).into(),
            );
        };

        let backend = self.identities().backend();
        match backend.find_post_by_remote_id(caller, notice.post_id)? {
            Some(post) => {
                backend.set_post_status(post.id, PostStatus::Trash)?;
                info!(caller = %caller, post = post.id, "Trashed mirrored copy of deleted post");
                Ok(PostDeletedAck { deleted: true })
            }
            None => {
                // Tombstones for posts never mirrored here are a normal,
                // silent no-op.
                debug!(caller = %caller, remote_post = notice.post_id, "No mirrored copy to delete");
                Ok(PostDeletedAck { deleted: false })
            }
        }
    }

    /// Store a private message from an authenticated friend.
    fn handle_message(&self, message: RemoteMessage) -> Result<MessageAck> {
        let Some(caller) = self.access().verify_combined(&message.auth)? else {
            return Err(
                HandshakeError::RequestFailed("Could not authenticate request".to_string()).into(),
            );
        };
        if message.message.is_empty() {
            return Err(HandshakeError::RequestFailed("Empty message".to_string()).into());
        }

        self.identities().backend().append_message(MessageRecord {
            from: caller,
            subject: message.subject,
            message: message.message,
            received: chrono::Utc::now().timestamp(),
        })?;
        Ok(MessageAck {
            status: MESSAGE_RECEIVED.to_string(),
        })
    }
}
