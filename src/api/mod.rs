//! API client for Mastodon servers

pub mod mastodon;

use anyhow::Result;
use std::future::Future;

use crate::models::{AccountSnapshot, Credential, Cursor, FeedKind, FeedRecord, InstanceMetadata, Page};

/// Operations the session and feed core needs from a Mastodon server.
///
/// Every future is `Send` so calls can run on spawned tasks.
pub trait MastodonApi: Send + Sync {
    /// One page of the ids `user_id` follows, starting after `max_id`
    fn following(
        &self,
        user_id: &str,
        max_id: Option<&Cursor>,
    ) -> impl Future<Output = Result<Page<String>>> + Send;

    /// Ids of blocked accounts
    fn blocked(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// Ids of accounts with a pending follow request
    fn follow_requests(&self) -> impl Future<Output = Result<Vec<String>>> + Send;

    /// One page of the given feed, starting after `max_id`
    fn feed_page(
        &self,
        kind: &FeedKind,
        max_id: Option<&Cursor>,
        limit: usize,
    ) -> impl Future<Output = Result<Page<FeedRecord>>> + Send;

    /// Verify the access token and get a fresh account snapshot
    fn verify_credentials(&self) -> impl Future<Output = Result<AccountSnapshot>> + Send;

    /// Get the server's instance metadata
    fn instance(&self) -> impl Future<Output = Result<InstanceMetadata>> + Send;

    /// Drop the server-side push subscription of this session
    fn cancel_subscription(&self) -> impl Future<Output = Result<()>> + Send;
}

/// Get the API client for a credential
pub fn client_for(credential: &Credential) -> mastodon::MastodonClient {
    mastodon::MastodonClient::new(&credential.base_url(), &credential.user_access_token)
}
