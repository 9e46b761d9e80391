//! Per-account relationship cache.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::models::CredentialId;

/// Relationship sets of one account
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    /// Ids of accounts this account follows
    pub following: HashSet<String>,
    /// Ids of blocked accounts
    pub blocked: HashSet<String>,
    /// Ids of accounts with a pending follow request
    pub follow_requested: HashSet<String>,
    /// When the sets were fetched
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Relationships {
    /// Whether the account follows `account_id`
    pub fn is_following(&self, account_id: &str) -> bool {
        self.following.contains(account_id)
    }

    /// Whether the account blocked `account_id`
    pub fn is_blocked(&self, account_id: &str) -> bool {
        self.blocked.contains(account_id)
    }
}

#[derive(Default)]
struct Entries {
    relationships: HashMap<CredentialId, Relationships>,
    stale: HashSet<CredentialId>,
}

/// Thread-safe relationship cache, shared between the sync task and readers.
///
/// Entries are only ever replaced whole.
#[derive(Clone, Default)]
pub struct RelationshipCache {
    entries: Arc<Mutex<Entries>>,
}

impl RelationshipCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the relationships of an account.
    pub fn get(&self, id: &CredentialId) -> Option<Relationships> {
        self.lock().relationships.get(id).cloned()
    }

    /// Replace all three sets of an account at once and clear its stale mark.
    pub fn replace(&self, id: &CredentialId, relationships: Relationships) {
        let mut entries = self.lock();
        entries.relationships.insert(id.clone(), relationships);
        entries.stale.remove(id);
    }

    /// Mark an account's entry as out of date until the next replace.
    pub fn mark_stale(&self, id: &CredentialId) {
        self.lock().stale.insert(id.clone());
    }

    /// Whether an account's entry is out of date.
    pub fn is_stale(&self, id: &CredentialId) -> bool {
        self.lock().stale.contains(id)
    }

    /// Drop everything cached for an account.
    pub fn remove(&self, id: &CredentialId) {
        let mut entries = self.lock();
        entries.relationships.remove(id);
        entries.stale.remove(id);
    }

    /// Number of accounts with cached relationships.
    pub fn len(&self) -> usize {
        self.lock().relationships.len()
    }

    /// Check if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().relationships.is_empty()
    }
}
