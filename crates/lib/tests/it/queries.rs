//! Query surface tests: merged sorting, search, limits, memoization.

use amity::identity::{Backing, IdentityRef, NewIdentity, Role, UserQuery};

use crate::helpers::setup_node;

/// Create a mix of user- and term-backed identities with staggered
/// registration timestamps.
fn seed_identities(node: &amity::Node) {
    let entries = [
        ("carol.example", "Carol", Role::Friend, Backing::User, 300),
        ("alice.example", "Alice", Role::Friend, Backing::User, 100),
        ("feed.example", "Zine Feed", Role::Subscription, Backing::Term, 500),
        ("bob.example", "Bob", Role::Acquaintance, Backing::User, 400),
        ("pending.example", "Pat", Role::PendingFriendRequest, Backing::User, 200),
    ];
    for (login, name, role, backing, registered) in entries {
        let identity = node
            .identities()
            .create(NewIdentity {
                login: login.to_string(),
                role,
                url: format!("https://{login}"),
                display_name: name.to_string(),
                icon_url: None,
                description: None,
                backing,
            })
            .unwrap();
        // Stagger registration times, which creation stamps with "now".
        match identity.id {
            IdentityRef::User(id) => {
                let mut record = node.backend().get_user(id).unwrap().unwrap();
                record.registered = registered;
                node.backend().update_user(&record).unwrap();
            }
            IdentityRef::Term(id) => {
                let mut record = node.backend().get_term(id).unwrap().unwrap();
                record.registered = registered;
                node.backend().update_term(&record).unwrap();
            }
        }
    }
    node.identities().invalidate_query_cache();
}

#[test]
fn test_merged_results_sorted_by_display_name() {
    let node = setup_node("https://local.example");
    seed_identities(&node);

    let results = node.identities().query(&UserQuery::new()).unwrap();
    let names: Vec<_> = results.iter().map(|i| i.display_name.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bob", "Carol", "Pat", "Zine Feed"]);
}

#[test]
fn test_role_filter_spans_both_variants() {
    let node = setup_node("https://local.example");
    seed_identities(&node);

    let results = node
        .identities()
        .query(&UserQuery::new().roles(&[Role::Friend, Role::Subscription]))
        .unwrap();
    let names: Vec<_> = results.iter().map(|i| i.display_name.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Carol", "Zine Feed"]);
}

#[test]
fn test_search_is_case_insensitive_substring() {
    let node = setup_node("https://local.example");
    seed_identities(&node);

    // Matches display name.
    let results = node
        .identities()
        .query(&UserQuery::new().search("zine"))
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].display_name, "Zine Feed");

    // Matches login.
    let results = node
        .identities()
        .query(&UserQuery::new().search("PENDING.EX"))
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].display_name, "Pat");
}

#[test]
fn test_limit_truncates_after_global_sort() {
    let node = setup_node("https://local.example");
    seed_identities(&node);

    // The term-backed "Zine Feed" sorts last; a limit of 2 must keep the
    // globally first entries, not two entries per backing store.
    let results = node.identities().query(&UserQuery::new().limit(2)).unwrap();
    let names: Vec<_> = results.iter().map(|i| i.display_name.as_str()).collect();
    assert_eq!(names, vec!["Alice", "Bob"]);
}

#[test]
fn test_recent_friends_subscriptions_ordered_by_registration() {
    let node = setup_node("https://local.example");
    seed_identities(&node);

    let results = node.identities().recent_friends_subscriptions(3).unwrap();
    let names: Vec<_> = results.iter().map(|i| i.display_name.as_str()).collect();
    // Newest first across both variants: Zine Feed (500), Bob (400),
    // Carol (300). Pat is pending and excluded; Alice truncated.
    assert_eq!(names, vec!["Zine Feed", "Bob", "Carol"]);
}

#[test]
fn test_recent_friends_subscriptions_with_fewer_entries_than_limit() {
    let node = setup_node("https://local.example");
    node.subscribe("https://only.example", Some("Only")).unwrap();

    let results = node.identities().recent_friends_subscriptions(3).unwrap();
    assert_eq!(results.len(), 1);
}

#[test]
fn test_named_queries_are_memoized_until_invalidated() {
    let node = setup_node("https://local.example");
    seed_identities(&node);

    let first = node.identities().all_friends().unwrap();
    assert_eq!(first.len(), 3);

    // Mutating the backend directly does not go through the manager, so
    // the memoized result is stale until explicitly invalidated.
    let mut record = node.backend().find_user_by_login("alice.example").unwrap().unwrap();
    record.role = Role::Subscription;
    node.backend().update_user(&record).unwrap();

    let cached = node.identities().all_friends().unwrap();
    assert_eq!(cached.len(), 3);

    node.identities().invalidate_query_cache();
    let fresh = node.identities().all_friends().unwrap();
    assert_eq!(fresh.len(), 2);
}

#[test]
fn test_mutations_through_manager_invalidate_cache() {
    let node = setup_node("https://local.example");
    seed_identities(&node);

    assert_eq!(node.identities().all_friends().unwrap().len(), 3);

    // Accepting the pending identity through the manager is immediately
    // visible.
    let pat = node
        .identities()
        .find_by_login("pending.example")
        .unwrap()
        .unwrap();
    node.identities().set_role(pat.id, Role::Friend).unwrap();
    assert_eq!(node.identities().all_friends().unwrap().len(), 4);
}

#[test]
fn test_bypass_cache_flag() {
    let node = setup_node("https://local.example");
    seed_identities(&node);

    // A bypassing query sees direct backend state even while the cached
    // variant would.
    let query = UserQuery::new()
        .roles(&[Role::Friend, Role::Acquaintance])
        .bypass_cache();
    assert_eq!(node.identities().query(&query).unwrap().len(), 3);
}
