//! Feed controller: ordered, de-duplicated records of one account's feeds.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};

use super::merge_unique;
use crate::api::MastodonApi;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{Cursor, FeedKind, FeedRecord};

/// Result of a page load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// This many new records were added
    Appended(usize),
    /// The server has nothing further for this feed
    Exhausted,
}

/// Holds the records of one account's feeds, keyed by kind.
///
/// Records keep server order and never share an identity. The whole
/// collection is republished after every mutation.
pub struct FeedController<A: MastodonApi> {
    api: A,
    credential_key: String,
    records: Vec<FeedRecord>,
    /// Absent: never loaded. `None`: no further pages.
    cursors: HashMap<FeedKind, Option<Cursor>>,
    records_tx: watch::Sender<Vec<FeedRecord>>,
    cache: Option<Arc<Mutex<Database>>>,
    page_limit: usize,
}

impl<A: MastodonApi> FeedController<A> {
    /// Create a controller without an on-disk cache
    pub fn new(api: A, credential_key: &str, page_limit: usize) -> Self {
        let (records_tx, _) = watch::channel(Vec::new());
        Self {
            api,
            credential_key: credential_key.to_string(),
            records: Vec::new(),
            cursors: HashMap::new(),
            records_tx,
            cache: None,
            page_limit,
        }
    }

    /// Create a controller that reads from and writes through to `cache`
    pub fn with_cache(
        api: A,
        credential_key: &str,
        page_limit: usize,
        cache: Arc<Mutex<Database>>,
    ) -> Self {
        let mut controller = Self::new(api, credential_key, page_limit);
        controller.cache = Some(cache);
        controller
    }

    /// Current records, all kinds
    pub fn records(&self) -> &[FeedRecord] {
        &self.records
    }

    /// Current records of one kind
    pub fn records_of<'a>(&'a self, kind: &'a FeedKind) -> impl Iterator<Item = &'a FeedRecord> {
        self.records.iter().filter(move |r| &r.kind == kind)
    }

    /// Watch the record collection
    pub fn subscribe(&self) -> watch::Receiver<Vec<FeedRecord>> {
        self.records_tx.subscribe()
    }

    /// Whether `kind` has been loaded and has no further pages
    pub fn is_exhausted(&self, kind: &FeedKind) -> bool {
        matches!(self.cursors.get(kind), Some(None))
    }

    /// Seed `kind` from the on-disk cache, before any network call.
    ///
    /// Returns how many records were added. The next `load_next` for this
    /// kind still starts from the first server page.
    pub async fn load_cached(&mut self, kind: &FeedKind) -> Result<usize> {
        let Some(cache) = &self.cache else {
            return Ok(0);
        };
        if !kind.is_cached() {
            return Ok(0);
        }

        let cached = cache.lock().await.load_feed(&self.credential_key, kind)?;
        let added = merge_unique(&mut self.records, cached);
        tracing::debug!("Seeded {added} {kind} records from cache");
        if added > 0 {
            self.publish();
        }
        Ok(added)
    }

    /// Fetch the first page of `kind` and replace that kind's records with it
    pub async fn load_initial(&mut self, kind: &FeedKind) -> Result<LoadOutcome> {
        let page = self
            .api
            .feed_page(kind, None, self.page_limit)
            .await
            .map_err(|e| Error::network(&e))?;

        let exhausted = page.items.is_empty();
        self.records.retain(|r| &r.kind != kind);
        let appended = merge_unique(&mut self.records, page.items);
        self.cursors
            .insert(kind.clone(), if exhausted { None } else { page.next_cursor });

        self.publish();
        self.write_through(kind).await;

        if exhausted {
            Ok(LoadOutcome::Exhausted)
        } else {
            Ok(LoadOutcome::Appended(appended))
        }
    }

    /// Fetch the page after the last one loaded for `kind` and append it
    pub async fn load_next(&mut self, kind: &FeedKind) -> Result<LoadOutcome> {
        let cursor = match self.cursors.get(kind) {
            None => return self.load_initial(kind).await,
            Some(None) => return Ok(LoadOutcome::Exhausted),
            Some(Some(cursor)) => cursor.clone(),
        };

        let page = self
            .api
            .feed_page(kind, Some(&cursor), self.page_limit)
            .await
            .map_err(|e| Error::network(&e))?;

        if page.items.is_empty() {
            self.cursors.insert(kind.clone(), None);
            return Ok(LoadOutcome::Exhausted);
        }

        let appended = merge_unique(&mut self.records, page.items);
        self.cursors.insert(kind.clone(), page.next_cursor);

        self.publish();
        self.write_through(kind).await;
        Ok(LoadOutcome::Appended(appended))
    }

    /// Clear every record and cursor
    pub fn reset(&mut self) {
        self.records.clear();
        self.cursors.clear();
        self.publish();
    }

    fn publish(&self) {
        self.records_tx.send_replace(self.records.clone());
    }

    async fn write_through(&self, kind: &FeedKind) {
        let Some(cache) = &self.cache else {
            return;
        };
        if !kind.is_cached() {
            return;
        }

        let records: Vec<FeedRecord> = self.records_of(kind).cloned().collect();
        if let Err(e) = cache
            .lock()
            .await
            .store_feed(&self.credential_key, kind, &records)
        {
            tracing::warn!("Failed to cache {kind} feed: {e}");
        }
    }
}
