//! Handshake tests: the full two-node exchange and its failure paths.

use amity::{
    Error,
    auth::{hash_pair, hash_value},
    handshake::{
        HandshakeError, RequestHandler,
        protocol::{
            AcceptMessage, ErrorCode, FriendRequestMessage, RestRequest, RestResponse,
        },
    },
    identity::{Backing, Identities, IdentityRef, NewIdentity, Role},
};

use amity::constants::PROTOCOL_VERSION;

use crate::helpers::{RoleTransitionCounter, setup_node, spawn_node, spawn_node_pair};

fn test_key(seed: &str) -> String {
    // Deterministic, long enough to pass key validation.
    format!("{seed}{}", "0".repeat(32))
}

/// Scenario A: two live nodes complete the full handshake and end up
/// with matching, mirrored token pairs and friend roles on both sides.
#[tokio::test]
async fn test_two_node_handshake_end_to_end() {
    let (node_a, url_a, node_b, url_b) = spawn_node_pair().await;

    // Step 1: A requests friendship with B.
    let b_on_a = node_a
        .send_friend_request(&url_b, Some("hello from A".to_string()), None)
        .await
        .unwrap();
    assert_eq!(b_on_a.role, Role::PendingFriendRequest);

    // B recorded the incoming request.
    let a_on_b = node_b.identities().find_by_url(&url_a).unwrap().unwrap();
    assert_eq!(a_on_b.role, Role::FriendRequest);

    // Steps 2-4: B's operator accepts, which notifies A and verifies the
    // returned signature.
    node_b
        .accept_friend_request(a_on_b.id, Role::Friend)
        .await
        .unwrap();

    // Both sides are friends now.
    let a_on_b = node_b.identities().get(a_on_b.id).unwrap();
    let b_on_a = node_a.identities().get(b_on_a.id).unwrap();
    assert_eq!(a_on_b.role, Role::Friend);
    assert_eq!(b_on_a.role, Role::Friend);

    // Token pairs are committed, non-equal, and mirrored.
    let a_in = node_a.access().in_token(b_on_a.id).unwrap().unwrap();
    let a_out = node_a.access().out_token(b_on_a.id).unwrap().unwrap();
    let b_in = node_b.access().in_token(a_on_b.id).unwrap().unwrap();
    let b_out = node_b.access().out_token(a_on_b.id).unwrap().unwrap();
    assert_ne!(a_in, a_out);
    assert_eq!(a_in, b_out);
    assert_eq!(a_out, b_in);
}

#[tokio::test]
async fn test_send_friend_request_rejects_own_site() {
    let (node, url) = spawn_node(|_| {}).await;
    let err = node.send_friend_request(&url, None, None).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Handshake(HandshakeError::InvalidSite { .. })
    ));
}

#[tokio::test]
async fn test_codeword_required_by_receiver() {
    let (node_a, _url_a, ..) = spawn_node_pair().await;
    let (_node_b, url_b) = spawn_node(|config| {
        config.required_codeword = Some("mellon".to_string());
    })
    .await;

    // Missing codeword: structured rejection for the operator.
    let err = node_a
        .send_friend_request(&url_b, None, None)
        .await
        .unwrap_err();
    match err {
        Error::Handshake(HandshakeError::PeerRejected { code, .. }) => {
            assert_eq!(code, "invalid_codeword");
        }
        other => panic!("Expected PeerRejected, got: {other:?}"),
    }

    // Retrying with the right codeword succeeds.
    node_a
        .send_friend_request(&url_b, None, Some("mellon".to_string()))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_version_mismatch_rejected_by_receiver() {
    let node = setup_node("https://local.example");
    let response = node
        .handshake()
        .handle_request(RestRequest::FriendRequest(FriendRequestMessage {
            version: 1,
            codeword: None,
            url: "https://peer.example".to_string(),
            key: test_key("k"),
            name: None,
            icon_url: None,
            message: None,
        }))
        .await;
    match response {
        RestResponse::Error(body) => {
            assert_eq!(body.code, ErrorCode::UnsupportedProtocolVersion);
        }
        other => panic!("Expected error response, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_short_key_rejected_by_receiver() {
    let node = setup_node("https://local.example");
    let response = node
        .handshake()
        .handle_request(RestRequest::FriendRequest(FriendRequestMessage {
            version: PROTOCOL_VERSION,
            codeword: None,
            url: "https://peer.example".to_string(),
            key: "short".to_string(),
            name: None,
            icon_url: None,
            message: None,
        }))
        .await;
    match response {
        RestResponse::Error(body) => assert_eq!(body.code, ErrorCode::InvalidKey),
        other => panic!("Expected error response, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_self_friending_rejected_by_receiver() {
    let node = setup_node("https://local.example");
    let response = node
        .handshake()
        .handle_request(RestRequest::FriendRequest(FriendRequestMessage {
            version: PROTOCOL_VERSION,
            codeword: None,
            url: "https://local.example/".to_string(),
            key: test_key("k"),
            name: None,
            icon_url: None,
            message: None,
        }))
        .await;
    match response {
        RestResponse::Error(body) => assert_eq!(body.code, ErrorCode::InvalidSite),
        other => panic!("Expected error response, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_inbound_request_promotes_existing_subscription() {
    let node = setup_node("https://local.example");
    let subscription = node.subscribe("https://peer.example", None).unwrap();
    assert!(subscription.id.is_term());

    let response = node
        .handshake()
        .handle_request(RestRequest::FriendRequest(FriendRequestMessage {
            version: PROTOCOL_VERSION,
            codeword: None,
            url: "https://peer.example".to_string(),
            key: test_key("k"),
            name: Some("Peer".to_string()),
            icon_url: None,
            message: None,
        }))
        .await;
    assert!(matches!(response, RestResponse::FriendRequest(_)));

    let identity = node
        .identities()
        .find_by_url("https://peer.example")
        .unwrap()
        .unwrap();
    assert!(identity.id.is_user());
    assert_eq!(identity.role, Role::FriendRequest);
    assert_eq!(identity.display_name, "Peer");
}

/// Seed the initiator-side state `send_friend_request` leaves behind,
/// without a live peer.
fn seed_initiator_state(node: &amity::Node, peer_url: &str, our_key: &str, request_id: &str) -> IdentityRef {
    let identity = node
        .identities()
        .create(NewIdentity {
            login: Identities::login_for_url(peer_url).unwrap(),
            role: Role::PendingFriendRequest,
            url: peer_url.to_string(),
            display_name: peer_url.to_string(),
            icon_url: None,
            description: None,
            backing: Backing::User,
        })
        .unwrap();
    let request_hash = hash_value(request_id);
    node.access()
        .store_future_in_token(&request_hash, our_key)
        .unwrap();
    node.access()
        .set_request_id(identity.id, &request_hash)
        .unwrap();
    identity.id
}

#[tokio::test]
async fn test_accept_handler_commits_and_signs() {
    let node = setup_node("https://local.example");
    let our_key = test_key("k1");
    let their_key = test_key("k2");
    let request_id = "r1";
    let id = seed_initiator_state(&node, "https://peer.example", &our_key, request_id);

    let response = node
        .handshake()
        .handle_request(RestRequest::AcceptFriendRequest(AcceptMessage {
            request: request_id.to_string(),
            proof: hash_pair(&our_key, request_id),
            key: their_key.clone(),
            name: Some("Peer".to_string()),
            icon_url: None,
        }))
        .await;

    let confirmation = match response {
        RestResponse::AcceptFriendRequest(confirmation) => confirmation,
        other => panic!("Expected confirmation, got: {other:?}"),
    };
    assert_eq!(confirmation.signature, hash_pair(&their_key, &our_key));

    let identity = node.identities().get(id).unwrap();
    assert_eq!(identity.role, Role::Friend);
    assert_eq!(
        node.access().in_token(id).unwrap().as_deref(),
        Some(our_key.as_str())
    );
    assert_eq!(
        node.access().out_token(id).unwrap().as_deref(),
        Some(their_key.as_str())
    );
}

#[tokio::test]
async fn test_accept_replay_rejected_without_side_effects() {
    let node = setup_node("https://local.example");
    let counter = RoleTransitionCounter::new(Role::Friend);
    node.identities().add_listener(counter.clone());

    let our_key = test_key("k1");
    let request_id = "r1";
    seed_initiator_state(&node, "https://peer.example", &our_key, request_id);

    let message = AcceptMessage {
        request: request_id.to_string(),
        proof: hash_pair(&our_key, request_id),
        key: test_key("k2"),
        name: None,
        icon_url: None,
    };

    let first = node
        .handshake()
        .handle_request(RestRequest::AcceptFriendRequest(message.clone()))
        .await;
    assert!(matches!(first, RestResponse::AcceptFriendRequest(_)));
    assert_eq!(counter.count(), 1);

    // The exact same request again: the handshake record was consumed.
    let second = node
        .handshake()
        .handle_request(RestRequest::AcceptFriendRequest(message))
        .await;
    match second {
        RestResponse::Error(body) => assert_eq!(body.code, ErrorCode::InvalidParameters),
        other => panic!("Expected error response, got: {other:?}"),
    }
    // The accepted side effect did not fire a second time.
    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn test_accept_with_wrong_proof_rejected() {
    let node = setup_node("https://local.example");
    let our_key = test_key("k1");
    let request_id = "r1";
    let id = seed_initiator_state(&node, "https://peer.example", &our_key, request_id);

    let response = node
        .handshake()
        .handle_request(RestRequest::AcceptFriendRequest(AcceptMessage {
            request: request_id.to_string(),
            proof: hash_pair("wrong-secret", request_id),
            key: test_key("k2"),
            name: None,
            icon_url: None,
        }))
        .await;
    match response {
        RestResponse::Error(body) => assert_eq!(body.code, ErrorCode::InvalidProof),
        other => panic!("Expected error response, got: {other:?}"),
    }
    // Nothing was committed.
    assert_eq!(node.identities().get(id).unwrap().role, Role::PendingFriendRequest);
    assert!(node.access().in_token(id).unwrap().is_none());
}

#[tokio::test]
async fn test_accept_after_withdrawal_is_no_longer_valid() {
    let node = setup_node("https://local.example");
    let our_key = test_key("k1");
    let request_id = "r1";
    let id = seed_initiator_state(&node, "https://peer.example", &our_key, request_id);

    // The operator withdrew the request in the meantime.
    node.identities().set_role(id, Role::Subscription).unwrap();

    let response = node
        .handshake()
        .handle_request(RestRequest::AcceptFriendRequest(AcceptMessage {
            request: request_id.to_string(),
            proof: hash_pair(&our_key, request_id),
            key: test_key("k2"),
            name: None,
            icon_url: None,
        }))
        .await;
    match response {
        RestResponse::Error(body) => assert_eq!(body.code, ErrorCode::OfferNoLongerValid),
        other => panic!("Expected error response, got: {other:?}"),
    }
}

#[test]
fn test_bad_signature_rolls_role_back() {
    let node = setup_node("https://local.example");
    let identity = node
        .identities()
        .create(NewIdentity {
            login: "peer.example".to_string(),
            role: Role::FriendRequest,
            url: "https://peer.example".to_string(),
            display_name: "Peer".to_string(),
            icon_url: None,
            description: None,
            backing: Backing::User,
        })
        .unwrap();
    // The operator accepted; the remote confirmation is still pending.
    node.identities().set_role(identity.id, Role::Friend).unwrap();

    let err = node
        .handshake()
        .finalize_acceptance(identity.id, &test_key("k2"), &test_key("k1"), "bogus")
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Handshake(HandshakeError::InvalidSignature)
    ));

    // Rolled back to an incoming request, not left as friend.
    let identity = node.identities().get(identity.id).unwrap();
    assert_eq!(identity.role, Role::FriendRequest);
    assert!(node.access().in_token(identity.id).unwrap().is_none());
}

#[test]
fn test_matching_signature_commits_pair() {
    let node = setup_node("https://local.example");
    let identity = node
        .identities()
        .create(NewIdentity {
            login: "peer.example".to_string(),
            role: Role::FriendRequest,
            url: "https://peer.example".to_string(),
            display_name: "Peer".to_string(),
            icon_url: None,
            description: None,
            backing: Backing::User,
        })
        .unwrap();
    node.identities().set_role(identity.id, Role::Friend).unwrap();

    let our_key = test_key("k2");
    let their_key = test_key("k1");
    node.handshake()
        .finalize_acceptance(identity.id, &our_key, &their_key, &hash_pair(&our_key, &their_key))
        .unwrap();

    assert_eq!(
        node.access().in_token(identity.id).unwrap().as_deref(),
        Some(our_key.as_str())
    );
    assert_eq!(
        node.access().out_token(identity.id).unwrap().as_deref(),
        Some(their_key.as_str())
    );
}

#[tokio::test]
async fn test_outgoing_request_promotes_subscription() {
    let (node_a, _url_a, _node_b, url_b) = spawn_node_pair().await;

    let subscription = node_a.subscribe(&url_b, Some("B's feed")).unwrap();
    assert!(subscription.id.is_term());

    let identity = node_a.send_friend_request(&url_b, None, None).await.unwrap();
    assert!(identity.id.is_user());
    assert_eq!(identity.role, Role::PendingFriendRequest);
    assert_eq!(identity.login, subscription.login);
}

#[tokio::test]
async fn test_send_friend_request_to_existing_friend_fails() {
    let (node_a, _url_a, node_b, url_b) = spawn_node_pair().await;

    let b_on_a = node_a.send_friend_request(&url_b, None, None).await.unwrap();
    let a_on_b = node_b
        .identities()
        .query(&amity::identity::UserQuery::new().roles(&[Role::FriendRequest]))
        .unwrap()
        .remove(0);
    node_b
        .accept_friend_request(a_on_b.id, Role::Friend)
        .await
        .unwrap();

    assert_eq!(node_a.identities().get(b_on_a.id).unwrap().role, Role::Friend);
    let err = node_a.send_friend_request(&url_b, None, None).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Handshake(HandshakeError::AlreadyFriends { .. })
    ));
}

#[tokio::test]
async fn test_acquaintance_acceptance_also_establishes_tokens() {
    let (node_a, url_a, node_b, url_b) = spawn_node_pair().await;

    let b_on_a = node_a.send_friend_request(&url_b, None, None).await.unwrap();
    let a_on_b = node_b.identities().find_by_url(&url_a).unwrap().unwrap();
    node_b
        .accept_friend_request(a_on_b.id, Role::Acquaintance)
        .await
        .unwrap();

    assert_eq!(
        node_b.identities().get(a_on_b.id).unwrap().role,
        Role::Acquaintance
    );
    assert!(node_b.access().in_token(a_on_b.id).unwrap().is_some());
    assert!(node_a.access().in_token(b_on_a.id).unwrap().is_some());
}
