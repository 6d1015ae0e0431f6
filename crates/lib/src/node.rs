//! The node facade: one site's view of the federation.
//!
//! [`Node`] ties together the backend, the identity model, access
//! control, and the handshake driver, and exposes the operator-facing
//! operations. Consumers authenticate inbound requests through
//! [`Node::authenticate`] and resolve callers through the identity
//! model.

use std::sync::Arc;

use tracing::info;

use crate::{
    Result,
    auth::{AccessControl, AuthOutcome, FeedQuery, RequestContext},
    backend::Backend,
    handshake::{Handshake, RequestHandler, SiteInfo},
    identity::{
        Backing, Capability, Identities, Identity, IdentityRef, NewIdentity, Role, RoleChange,
        RoleChangeListener,
    },
    transport::{HttpTransport, Transport},
};

/// Configuration for a node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Canonical URL of this site
    pub site_url: String,
    /// Site ID; scopes query memoization in multisite deployments
    pub site_id: u32,
    /// Whether this deployment is part of a multisite network
    pub multisite: bool,
    /// Display name presented to peers
    pub display_name: Option<String>,
    /// Icon presented to peers
    pub icon_url: Option<String>,
    /// Codeword required from inbound friend requests
    pub required_codeword: Option<String>,
    /// Accept legacy proofs lacking `until`/`auth` on token match alone
    pub legacy_token_auth: bool,
    /// Verify inbound friend requests by probing the requester's site
    pub probe_requester: bool,
}

impl NodeConfig {
    /// Configuration with defaults: single-site, no codeword, legacy
    /// grace mode off, requester probing on.
    pub fn new(site_url: impl Into<String>) -> Self {
        Self {
            site_url: site_url.into(),
            site_id: 1,
            multisite: false,
            display_name: None,
            icon_url: None,
            required_codeword: None,
            legacy_token_auth: false,
            probe_requester: true,
        }
    }
}

/// A federation node.
pub struct Node {
    config: NodeConfig,
    backend: Arc<dyn Backend>,
    identities: Arc<Identities>,
    access: Arc<AccessControl>,
    handshake: Arc<Handshake>,
    transport: Arc<dyn Transport>,
}

/// Surfaces new incoming friend requests to the operator's log.
struct OperatorNotifier;

impl RoleChangeListener for OperatorNotifier {
    fn role_changed(&self, change: &RoleChange) {
        if change.new_role == Role::FriendRequest {
            info!(
                login = %change.identity.login,
                url = %change.identity.url,
                "New friend request awaiting review"
            );
        }
    }
}

impl Node {
    /// Create a node over the given backend, speaking HTTP.
    pub fn new(config: NodeConfig, backend: Arc<dyn Backend>) -> Result<Self> {
        let site_url = crate::identity::normalize_site_url(&config.site_url)?;
        let identities = Arc::new(Identities::new(backend.clone(), config.site_id));
        identities.add_listener(Arc::new(OperatorNotifier));

        let access = Arc::new(AccessControl::new(
            backend.clone(),
            identities.clone(),
            site_url.clone(),
            config.multisite,
            config.legacy_token_auth,
        ));
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);
        let handshake = Arc::new(Handshake::new(
            SiteInfo {
                url: site_url,
                display_name: config.display_name.clone(),
                icon_url: config.icon_url.clone(),
                required_codeword: config.required_codeword.clone(),
                probe_requester: config.probe_requester,
            },
            identities.clone(),
            access.clone(),
            transport.clone(),
        ));

        Ok(Self {
            config,
            backend,
            identities,
            access,
            handshake,
            transport,
        })
    }

    // === Server lifecycle ===

    /// Start serving the federation endpoints.
    pub async fn start_server(&self, addr: &str) -> Result<()> {
        let handler: Arc<dyn RequestHandler> = self.handshake.clone();
        self.transport.start_server(addr, handler).await
    }

    /// Stop the federation server.
    pub async fn stop_server(&self) -> Result<()> {
        self.transport.stop_server().await
    }

    /// The bound server address, once started.
    pub fn server_address(&self) -> Result<String> {
        self.transport.server_address()
    }

    // === Operator actions ===

    /// Subscribe to a remote site's feed without any reciprocal trust.
    pub fn subscribe(&self, url: &str, display_name: Option<&str>) -> Result<Identity> {
        let normalized = crate::identity::normalize_site_url(url)?;
        self.identities.create(NewIdentity {
            login: Identities::login_for_url(&normalized)?,
            role: Role::Subscription,
            url: normalized.clone(),
            display_name: display_name.unwrap_or(&normalized).to_string(),
            icon_url: None,
            description: None,
            backing: Backing::Term,
        })
    }

    /// Send a friend request to a remote site.
    pub async fn send_friend_request(
        &self,
        url: &str,
        message: Option<String>,
        codeword: Option<String>,
    ) -> Result<Identity> {
        self.handshake.send_friend_request(url, message, codeword).await
    }

    /// Accept an incoming friend request, granting the given friend
    /// role, and notify the requester.
    ///
    /// The role transition happens first; a failed notification leaves
    /// the role in place for the operator to re-trigger.
    pub async fn accept_friend_request(&self, id: IdentityRef, role: Role) -> Result<Identity> {
        if !role.grants(Capability::Friend) {
            let current = self.identities.get(id)?;
            return Err(crate::identity::IdentityError::InvalidRoleTransition {
                from: current.role,
                to: role,
            }
            .into());
        }
        let id = self.ensure_user_backed(id)?;
        let identity = self.identities.set_role(id, role)?;
        self.handshake.notify_accepted(id).await?;
        Ok(identity)
    }

    /// Reject an incoming friend request, removing the identity and any
    /// handshake state.
    pub fn reject_friend_request(&self, id: IdentityRef) -> Result<()> {
        self.remove_identity(id)
    }

    /// End a friendship: tokens are invalidated before the identity is
    /// destroyed.
    pub fn unfriend(&self, id: IdentityRef) -> Result<()> {
        self.remove_identity(id)
    }

    fn remove_identity(&self, id: IdentityRef) -> Result<()> {
        // Token cleanup first: the in_token index entry must not outlive
        // the identity it points at.
        self.access.delete_tokens(id)?;
        self.identities.delete(id)
    }

    fn ensure_user_backed(&self, id: IdentityRef) -> Result<IdentityRef> {
        if id.is_term() {
            Ok(self.identities.convert_to_user(id)?.id)
        } else {
            Ok(id)
        }
    }

    // === Request-side entry points ===

    /// Create a fresh request-scoped context.
    pub fn new_request_context(&self) -> RequestContext {
        RequestContext::new()
    }

    /// Authenticate an inbound feed/page request from its query string.
    pub fn authenticate(
        &self,
        ctx: &mut RequestContext,
        incoming: AuthOutcome,
        query_string: &str,
    ) -> Result<AuthOutcome> {
        let query = FeedQuery::parse(query_string);
        self.access.authenticate(ctx, incoming, &query)
    }

    /// Notify all friends that a local post was deleted.
    pub async fn notify_friends_post_deleted(&self, post_id: u64) -> Result<usize> {
        self.handshake.notify_friends_post_deleted(post_id).await
    }

    /// Send a private message to a friend.
    pub async fn send_message(
        &self,
        id: IdentityRef,
        subject: &str,
        message: &str,
    ) -> Result<()> {
        self.handshake.send_message(id, subject, message).await
    }

    // === Component access ===

    /// This node's configuration.
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// The storage backend.
    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.backend
    }

    /// The identity model.
    pub fn identities(&self) -> &Arc<Identities> {
        &self.identities
    }

    /// Access control.
    pub fn access(&self) -> &Arc<AccessControl> {
        &self.access
    }

    /// The handshake driver.
    pub fn handshake(&self) -> &Arc<Handshake> {
        &self.handshake
    }
}
