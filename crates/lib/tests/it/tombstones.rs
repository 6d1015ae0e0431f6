//! Tombstone propagation and private message tests.

use amity::{
    backend::{NewPostRecord, PostStatus},
    handshake::{
        RequestHandler,
        protocol::{ErrorCode, PostDeletedNotice, RemoteMessage, RestRequest, RestResponse},
    },
    identity::{Identity, Role},
};

use crate::helpers::{setup_node, spawn_node_pair};

/// Establish a live friendship and return both nodes with their views of
/// each other.
async fn befriended_pair() -> (amity::Node, Identity, amity::Node, Identity) {
    let (node_a, url_a, node_b, url_b) = spawn_node_pair().await;
    let b_on_a = node_a.send_friend_request(&url_b, None, None).await.unwrap();
    let a_on_b = node_b.identities().find_by_url(&url_a).unwrap().unwrap();
    node_b
        .accept_friend_request(a_on_b.id, Role::Friend)
        .await
        .unwrap();
    let b_on_a = node_a.identities().get(b_on_a.id).unwrap();
    let a_on_b = node_b.identities().get(a_on_b.id).unwrap();
    (node_a, b_on_a, node_b, a_on_b)
}

#[tokio::test]
async fn test_post_deletion_propagates_to_friends() {
    let (node_a, _b_on_a, node_b, a_on_b) = befriended_pair().await;

    // B mirrors one of A's posts as remote ID 42.
    let mirrored = node_b
        .backend()
        .create_post(NewPostRecord {
            author: a_on_b.id,
            remote_id: Some(42),
            title: "Mirrored".to_string(),
            status: PostStatus::Publish,
        })
        .unwrap();

    // A deletes post 42 locally and notifies friends.
    let deleted = node_a.notify_friends_post_deleted(42).await.unwrap();
    assert_eq!(deleted, 1);

    let post = node_b.backend().get_post(mirrored.id).unwrap().unwrap();
    assert_eq!(post.status, PostStatus::Trash);
}

#[tokio::test]
async fn test_tombstone_for_unmirrored_post_is_silent_noop() {
    let (node_a, _b_on_a, node_b, a_on_b) = befriended_pair().await;

    let deleted = node_a.notify_friends_post_deleted(999).await.unwrap();
    assert_eq!(deleted, 0);

    // No error surfaced anywhere; B simply has nothing to delete.
    assert!(
        node_b
            .backend()
            .posts_by_author(a_on_b.id)
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_tombstone_requires_authentication() {
    let node = setup_node("https://local.example");
    let response = node
        .handshake()
        .handle_request(RestRequest::PostDeleted(PostDeletedNotice {
            post_id: 42,
            auth: "not-a-valid-proof".to_string(),
        }))
        .await;
    match response {
        RestResponse::Error(body) => assert_eq!(body.code, ErrorCode::RequestFailed),
        other => panic!("Expected error response, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_tombstone_from_non_friend_is_rejected() {
    let node = setup_node("https://local.example");
    // A subscription identity with a (misissued) token pair still may
    // not delete anything: the proof verifies, the capability check
    // rejects.
    let (_identity, in_token, _out) =
        crate::helpers::friend_with_tokens(&node, "https://sub.example", Role::Subscription);

    let until = chrono::Utc::now().timestamp() + 600;
    let proof = amity::auth::hash_proof(until, &in_token);
    let inbound_auth = amity::auth::format_combined(&in_token, until, &proof);
    assert!(
        node.access()
            .verify_token(&in_token, Some(until), Some(&proof))
            .unwrap()
            .is_some()
    );

    let response = node
        .handshake()
        .handle_request(RestRequest::PostDeleted(PostDeletedNotice {
            post_id: 42,
            auth: inbound_auth,
        }))
        .await;
    match response {
        RestResponse::Error(body) => assert_eq!(body.code, ErrorCode::RequestFailed),
        other => panic!("Expected error response, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_message_delivery_between_friends() {
    let (node_a, b_on_a, node_b, a_on_b) = befriended_pair().await;

    node_a
        .send_message(b_on_a.id, "Greetings", "Hello over the wire")
        .await
        .unwrap();

    let messages = node_b.backend().list_messages(Some(a_on_b.id)).unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].1.subject, "Greetings");
    assert_eq!(messages[0].1.message, "Hello over the wire");
}

#[tokio::test]
async fn test_message_requires_authentication() {
    let node = setup_node("https://local.example");
    let response = node
        .handshake()
        .handle_request(RestRequest::Message(RemoteMessage {
            subject: "spam".to_string(),
            message: "spam".to_string(),
            auth: "bogus".to_string(),
        }))
        .await;
    match response {
        RestResponse::Error(body) => assert_eq!(body.code, ErrorCode::RequestFailed),
        other => panic!("Expected error response, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_message_without_token_pair_fails_client_side() {
    let node = setup_node("https://local.example");
    let subscription = node.subscribe("https://feed.example", None).unwrap();

    let err = node
        .send_message(subscription.id, "hi", "there")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        amity::Error::Auth(amity::auth::AuthError::NoTokenPair(_))
    ));
}
