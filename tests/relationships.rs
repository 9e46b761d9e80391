//! Relationship refresh and the debounced background sync

mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tokio::time::{Duration, sleep};

use common::{MockApi, credential};
use tusk::auth::{MemoryStore, SessionRegistry};
use tusk::models::Credential;
use tusk::sync::{RelationshipCache, RelationshipRefresher, Relationships, spawn_relationship_sync};

fn set(ids: &[&str]) -> HashSet<String> {
    ids.iter().map(ToString::to_string).collect()
}

fn paged_api() -> MockApi {
    MockApi::new()
        .with_following(None, &["1", "2"], Some("c1"))
        .with_following(Some("c1"), &["3", "4"], Some("c2"))
        .with_following(Some("c2"), &["5"], None)
        .with_blocked(&["66"])
        .with_follow_requests(&["77", "78"])
}

#[tokio::test]
async fn refresh_pages_following_to_the_end() {
    let api = paged_api();
    let refresher = RelationshipRefresher::new(RelationshipCache::new());
    let account = credential("mastodon.social", "42");

    refresher.refresh(&api, &account).await.unwrap();

    let relationships = refresher.cache().get(&account.id()).unwrap();
    assert_eq!(relationships.following, set(&["1", "2", "3", "4", "5"]));
    assert_eq!(relationships.blocked, set(&["66"]));
    assert_eq!(relationships.follow_requested, set(&["77", "78"]));
    assert!(relationships.refreshed_at.is_some());
    assert_eq!(api.following_calls(), vec!["42", "42", "42"]);
}

#[tokio::test]
async fn failed_page_leaves_previous_sets() {
    let api = paged_api();
    api.fail_following_at(Some("c2"));
    let refresher = RelationshipRefresher::new(RelationshipCache::new());
    let account = credential("mastodon.social", "42");
    let previous = Relationships {
        following: set(&["old"]),
        blocked: set(&["old-block"]),
        ..Relationships::default()
    };
    refresher.cache().replace(&account.id(), previous.clone());

    assert!(matches!(
        refresher.refresh(&api, &account).await,
        Err(tusk::Error::Network(_))
    ));
    assert_eq!(refresher.cache().get(&account.id()), Some(previous));
}

#[tokio::test]
async fn failed_blocked_call_leaves_previous_sets() {
    let api = paged_api();
    api.state.fail_blocked.store(true, Ordering::SeqCst);
    let refresher = RelationshipRefresher::new(RelationshipCache::new());
    let account = credential("mastodon.social", "42");

    assert!(refresher.refresh(&api, &account).await.is_err());
    assert!(refresher.cache().get(&account.id()).is_none());
    // Following was paged completely before blocks were asked for
    assert_eq!(api.following_calls().len(), 3);
}

fn spawn_sync(registry: &SessionRegistry, api: &MockApi) -> Arc<RelationshipRefresher> {
    let refresher = Arc::new(RelationshipRefresher::new(RelationshipCache::new()));
    let api = api.clone();
    spawn_relationship_sync(
        registry.subscribe_active(),
        Arc::clone(&refresher),
        move |_: &Credential| api.clone(),
        Duration::from_secs(3),
    );
    refresher
}

#[tokio::test(start_paused = true)]
async fn activation_refreshes_after_quiet_window() {
    let api = paged_api();
    let mut registry = SessionRegistry::new(Arc::new(MemoryStore::new()));
    let refresher = spawn_sync(&registry, &api);
    let account = credential("mastodon.social", "42");

    registry.activate_or_insert(account.clone());
    sleep(Duration::from_secs(2)).await;
    assert!(api.following_calls().is_empty());
    assert!(refresher.cache().is_stale(&account.id()));

    sleep(Duration::from_secs(2)).await;
    assert_eq!(api.following_calls().len(), 3);
    assert!(!refresher.cache().is_stale(&account.id()));
}

#[tokio::test(start_paused = true)]
async fn reactivating_active_account_does_not_refresh() {
    let api = paged_api();
    let mut registry = SessionRegistry::new(Arc::new(MemoryStore::new()));
    let _refresher = spawn_sync(&registry, &api);

    registry.activate_or_insert(credential("mastodon.social", "42"));
    sleep(Duration::from_secs(4)).await;
    let after_first = api.following_calls().len();
    assert_eq!(after_first, 3);

    // Same identity, new token: not an activation change
    let mut refreshed = credential("mastodon.social", "42");
    refreshed.user_access_token = "rotated".to_string();
    registry.activate_or_insert(refreshed);
    registry.activate("42", "mastodon.social");
    sleep(Duration::from_secs(10)).await;

    assert_eq!(api.following_calls().len(), after_first);
}

#[tokio::test(start_paused = true)]
async fn rapid_switches_refresh_only_the_last_account() {
    let api = paged_api();
    let mut registry = SessionRegistry::new(Arc::new(MemoryStore::new()));
    let refresher = spawn_sync(&registry, &api);

    registry.activate_or_insert(credential("a.example", "1"));
    sleep(Duration::from_secs(1)).await;
    registry.activate_or_insert(credential("b.example", "2"));
    sleep(Duration::from_secs(1)).await;
    registry.activate_or_insert(credential("c.example", "3"));
    sleep(Duration::from_secs(5)).await;

    assert_eq!(api.following_calls(), vec!["3", "3", "3"]);
    assert!(refresher.cache().is_stale(&tusk::CredentialId::new("a.example", "1")));
    assert!(refresher.cache().is_stale(&tusk::CredentialId::new("b.example", "2")));
    assert!(!refresher.cache().is_stale(&tusk::CredentialId::new("c.example", "3")));
}
