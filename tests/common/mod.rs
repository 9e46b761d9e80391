//! Scripted Mastodon API shared by the integration tests
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tusk::api::MastodonApi;
use tusk::models::{
    AccountSnapshot, Credential, Cursor, FeedKind, FeedRecord, InstanceMetadata, Page, Status,
};

#[derive(Default)]
pub struct MockState {
    /// Following pages keyed by the cursor that requests them
    pub following: Mutex<HashMap<Option<String>, Page<String>>>,
    /// Cursor whose following page fails
    pub following_fails_at: Mutex<Option<Option<String>>>,
    /// User ids `following` was called for, in order
    pub following_calls: Mutex<Vec<String>>,
    pub blocked: Mutex<Vec<String>>,
    pub follow_requests: Mutex<Vec<String>>,
    pub fail_blocked: AtomicBool,
    /// Feed pages keyed by feed name and cursor
    pub feeds: Mutex<HashMap<(String, Option<String>), Page<FeedRecord>>>,
    pub feed_calls: AtomicUsize,
    pub fail_feeds: AtomicBool,
    pub account: Mutex<Option<AccountSnapshot>>,
    pub cancel_calls: AtomicUsize,
    pub fail_cancel: AtomicBool,
}

#[derive(Clone, Default)]
pub struct MockApi {
    pub state: Arc<MockState>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_following(self, cursor: Option<&str>, ids: &[&str], next: Option<&str>) -> Self {
        self.state.following.lock().unwrap().insert(
            cursor.map(String::from),
            Page::new(
                ids.iter().map(ToString::to_string).collect(),
                next.map(Cursor::new),
            ),
        );
        self
    }

    pub fn with_blocked(self, ids: &[&str]) -> Self {
        *self.state.blocked.lock().unwrap() = ids.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with_follow_requests(self, ids: &[&str]) -> Self {
        *self.state.follow_requests.lock().unwrap() = ids.iter().map(ToString::to_string).collect();
        self
    }

    pub fn with_feed(self, kind: &FeedKind, cursor: Option<&str>, ids: &[String], next: Option<&str>) -> Self {
        self.state.feeds.lock().unwrap().insert(
            (kind.name(), cursor.map(String::from)),
            Page::new(statuses(kind, ids), next.map(Cursor::new)),
        );
        self
    }

    pub fn fail_following_at(&self, cursor: Option<&str>) {
        *self.state.following_fails_at.lock().unwrap() = Some(cursor.map(String::from));
    }

    pub fn following_calls(&self) -> Vec<String> {
        self.state.following_calls.lock().unwrap().clone()
    }
}

impl MastodonApi for MockApi {
    async fn following(&self, user_id: &str, max_id: Option<&Cursor>) -> anyhow::Result<Page<String>> {
        self.state.following_calls.lock().unwrap().push(user_id.to_string());
        let cursor = max_id.map(|c| c.as_str().to_string());
        if self.state.following_fails_at.lock().unwrap().as_ref() == Some(&cursor) {
            anyhow::bail!("following page {cursor:?} failed");
        }
        Ok(self
            .state
            .following
            .lock()
            .unwrap()
            .get(&cursor)
            .cloned()
            .unwrap_or_else(|| Page::last(Vec::new())))
    }

    async fn blocked(&self) -> anyhow::Result<Vec<String>> {
        if self.state.fail_blocked.load(Ordering::SeqCst) {
            anyhow::bail!("blocks unavailable");
        }
        Ok(self.state.blocked.lock().unwrap().clone())
    }

    async fn follow_requests(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.state.follow_requests.lock().unwrap().clone())
    }

    async fn feed_page(
        &self,
        kind: &FeedKind,
        max_id: Option<&Cursor>,
        _limit: usize,
    ) -> anyhow::Result<Page<FeedRecord>> {
        self.state.feed_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_feeds.load(Ordering::SeqCst) {
            anyhow::bail!("timeline unavailable");
        }
        let key = (kind.name(), max_id.map(|c| c.as_str().to_string()));
        Ok(self
            .state
            .feeds
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .unwrap_or_else(|| Page::last(Vec::new())))
    }

    async fn verify_credentials(&self) -> anyhow::Result<AccountSnapshot> {
        self.state
            .account
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("401 Unauthorized"))
    }

    async fn instance(&self) -> anyhow::Result<InstanceMetadata> {
        Ok(InstanceMetadata::default())
    }

    async fn cancel_subscription(&self) -> anyhow::Result<()> {
        self.state.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_cancel.load(Ordering::SeqCst) {
            anyhow::bail!("push subscription endpoint unavailable");
        }
        Ok(())
    }
}

pub fn ids(range: std::ops::Range<u32>) -> Vec<String> {
    range.map(|i| format!("{i:04}")).collect()
}

pub fn statuses(kind: &FeedKind, ids: &[String]) -> Vec<FeedRecord> {
    ids.iter()
        .map(|id| FeedRecord::status(kind.clone(), Status::new(id)))
        .collect()
}

pub fn record_ids(records: &[FeedRecord]) -> Vec<String> {
    use tusk::models::Identity;
    records.iter().map(|r| r.identity().to_string()).collect()
}

/// A credential with an account snapshot, as a signed-in account would have
pub fn credential(domain: &str, user_id: &str) -> Credential {
    let username = format!("user{user_id}");
    Credential::new(domain, user_id, &username, &format!("token-{user_id}"))
        .with_cached_account(AccountSnapshot::new(user_id, &username))
}
