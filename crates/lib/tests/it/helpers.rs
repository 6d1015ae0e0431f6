//! Helper functions for integration testing.
//!
//! Provides node setup, live two-node HTTP pairs, and identity/token
//! fixtures shared across the test modules.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use amity::{
    Node, NodeConfig,
    backend::InMemory,
    identity::{Backing, Identity, NewIdentity, Role, RoleChange, RoleChangeListener},
};

/// Node configuration suitable for handler-level tests: no requester
/// probing, so inbound friend requests don't need a live peer.
pub fn test_config(site_url: &str) -> NodeConfig {
    let mut config = NodeConfig::new(site_url);
    config.probe_requester = false;
    config
}

/// Create a node over a fresh in-memory backend.
pub fn setup_node(site_url: &str) -> Node {
    Node::new(test_config(site_url), Arc::new(InMemory::new())).expect("Failed to create node")
}

/// Create a node whose config was adjusted by the caller.
pub fn setup_node_with(config: NodeConfig) -> Node {
    Node::new(config, Arc::new(InMemory::new())).expect("Failed to create node")
}

/// Reserve a local port so a node can advertise its own URL before the
/// server is bound.
fn reserve_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("Failed to reserve port");
    let port = listener.local_addr().expect("Failed to read port").port();
    drop(listener);
    port
}

/// Spawn a node serving on localhost, advertising its reachable URL.
///
/// Returns the node and its base URL as peers should contact it.
pub async fn spawn_node(configure: impl FnOnce(&mut NodeConfig)) -> (Node, String) {
    let port = reserve_port();
    let url = format!("http://127.0.0.1:{port}");
    let mut config = NodeConfig::new(&url);
    configure(&mut config);
    let node = Node::new(config, Arc::new(InMemory::new())).expect("Failed to create node");
    node.start_server(&format!("127.0.0.1:{port}"))
        .await
        .expect("Failed to start server");
    (node, url)
}

/// Spawn a connected pair of nodes with default configuration.
pub async fn spawn_node_pair() -> (Node, String, Node, String) {
    let (node_a, url_a) = spawn_node(|_| {}).await;
    let (node_b, url_b) = spawn_node(|_| {}).await;
    (node_a, url_a, node_b, url_b)
}

/// Create a user-backed identity with a committed token pair, returning
/// the identity and its `(in_token, out_token)`.
pub fn friend_with_tokens(node: &Node, url: &str, role: Role) -> (Identity, String, String) {
    let identity = node
        .identities()
        .create(NewIdentity {
            login: amity::identity::Identities::login_for_url(url).unwrap(),
            role,
            url: url.to_string(),
            display_name: url.to_string(),
            icon_url: None,
            description: None,
            backing: Backing::User,
        })
        .expect("Failed to create identity");
    let in_token = amity::auth::generate_token();
    let out_token = amity::auth::generate_token();
    node.access()
        .make_friend(identity.id, &in_token, &out_token)
        .expect("Failed to commit token pair");
    (identity, in_token, out_token)
}

/// Listener recording transitions into a specific role.
pub struct RoleTransitionCounter {
    role: Role,
    count: AtomicUsize,
}

impl RoleTransitionCounter {
    pub fn new(role: Role) -> Arc<Self> {
        Arc::new(Self {
            role,
            count: AtomicUsize::new(0),
        })
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl RoleChangeListener for RoleTransitionCounter {
    fn role_changed(&self, change: &RoleChange) {
        if change.new_role == self.role {
            self.count.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// A future Unix timestamp.
pub fn future_ts(seconds: i64) -> i64 {
    chrono::Utc::now().timestamp() + seconds
}

/// A past Unix timestamp.
pub fn past_ts(seconds: i64) -> i64 {
    chrono::Utc::now().timestamp() - seconds
}
