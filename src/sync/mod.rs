//! Background sync of relationship sets for the active account

mod cache;

pub use cache::{RelationshipCache, Relationships};

use chrono::Utc;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Duration, sleep};

use crate::api::MastodonApi;
use crate::error::{Error, Result};
use crate::models::{Credential, Cursor};

/// Fetches following, blocked and follow-request sets into a cache
pub struct RelationshipRefresher {
    cache: RelationshipCache,
}

impl RelationshipRefresher {
    /// Create a refresher writing into `cache`
    pub const fn new(cache: RelationshipCache) -> Self {
        Self { cache }
    }

    /// The cache this refresher writes into
    pub const fn cache(&self) -> &RelationshipCache {
        &self.cache
    }

    /// Refresh every relationship set of `credential`.
    ///
    /// The following list is paged to the end before anything else is
    /// fetched. The cache entry is replaced only if every call succeeds; on
    /// any error the previous entry stays as it was.
    pub async fn refresh<A: MastodonApi>(&self, api: &A, credential: &Credential) -> Result<()> {
        let following = fetch_all_following(api, &credential.user_id).await?;

        let blocked = api
            .blocked()
            .await
            .map_err(|e| Error::network(&e))?
            .into_iter()
            .collect();
        let follow_requested = api
            .follow_requests()
            .await
            .map_err(|e| Error::network(&e))?
            .into_iter()
            .collect();

        tracing::debug!(
            "Refreshed relationships for {}: {} following",
            credential.id(),
            following.len()
        );

        self.cache.replace(
            &credential.id(),
            Relationships {
                following,
                blocked,
                follow_requested,
                refreshed_at: Some(Utc::now()),
            },
        );
        Ok(())
    }
}

/// Page through the whole following list
async fn fetch_all_following<A: MastodonApi>(api: &A, user_id: &str) -> Result<HashSet<String>> {
    let mut ids = HashSet::new();
    let mut cursor: Option<Cursor> = None;

    loop {
        let page = api
            .following(user_id, cursor.as_ref())
            .await
            .map_err(|e| Error::network(&e))?;
        ids.extend(page.items);

        match page.next_cursor {
            Some(next) if cursor.as_ref() == Some(&next) => {
                tracing::warn!("Server repeated following cursor {next}, stopping");
                break;
            }
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(ids)
}

/// Spawn the task that keeps the active account's relationships fresh.
///
/// Each change of the active account marks its entry stale. The refresh runs
/// once the active account has stayed the same for `quiet`, so a burst of
/// switches only refreshes the account that ends up active. The task ends
/// when the registry is dropped.
pub fn spawn_relationship_sync<A, F>(
    mut active_rx: watch::Receiver<Option<Credential>>,
    refresher: Arc<RelationshipRefresher>,
    api_for: F,
    quiet: Duration,
) -> JoinHandle<()>
where
    A: MastodonApi + 'static,
    F: Fn(&Credential) -> A + Send + 'static,
{
    tokio::spawn(async move {
        let mut pending = mark_stale(&refresher, active_rx.borrow_and_update().clone());

        loop {
            let Some(credential) = pending.take() else {
                if active_rx.changed().await.is_err() {
                    break;
                }
                pending = mark_stale(&refresher, active_rx.borrow_and_update().clone());
                continue;
            };

            tokio::select! {
                changed = active_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    pending = mark_stale(&refresher, active_rx.borrow_and_update().clone());
                }
                () = sleep(quiet) => {
                    // Tokens may have been refreshed without an identity change
                    let current = active_rx
                        .borrow()
                        .clone()
                        .filter(|c| c.same_identity(&credential))
                        .unwrap_or(credential);
                    let api = api_for(&current);
                    if let Err(e) = refresher.refresh(&api, &current).await {
                        tracing::warn!("Relationship refresh for {} failed: {e}", current.id());
                    }
                }
            }
        }

        tracing::debug!("Relationship sync task shutting down");
    })
}

fn mark_stale(refresher: &RelationshipRefresher, active: Option<Credential>) -> Option<Credential> {
    if let Some(credential) = &active {
        refresher.cache().mark_stale(&credential.id());
    }
    active
}
