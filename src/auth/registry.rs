//! Session registry: every signed-in account, most recently active first.
//!
//! The registry is owned by one task. Every mutation runs the same pipeline:
//! sort by activation time, republish the sequence, republish the active
//! credential (notifying only when its identity changed) and hand a snapshot
//! to the background persistence task.

use chrono::{DateTime, TimeDelta, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::watch;

use super::persist::Persister;
use super::{CredentialStore, decode_credential};
use crate::api::MastodonApi;
use crate::db::Database;
use crate::error::{Error, Result};
use crate::models::{AccountSnapshot, Credential, CredentialId, InstanceMetadata};

/// In-memory, ordered collection of credentials with one active entry
pub struct SessionRegistry {
    store: Arc<dyn CredentialStore>,
    credentials: Vec<Credential>,
    active_tx: watch::Sender<Option<Credential>>,
    credentials_tx: watch::Sender<Vec<Credential>>,
    persister: Persister,
}

impl SessionRegistry {
    /// Create an empty registry over `store` without reading it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(store: Arc<dyn CredentialStore>) -> Self {
        let persister = Persister::spawn(Arc::clone(&store));
        let (active_tx, _) = watch::channel(None);
        let (credentials_tx, _) = watch::channel(Vec::new());

        Self {
            store,
            credentials: Vec::new(),
            active_tx,
            credentials_tx,
            persister,
        }
    }

    /// Create a registry from everything readable in `store`.
    ///
    /// Undecodable entries are skipped and left in place. If none of the
    /// restored credentials carries a cached account snapshot the store is
    /// treated as left over from a previous install and wiped. Unverified
    /// legacy imports never count as left over.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn restore(store: Arc<dyn CredentialStore>) -> Self {
        let mut registry = Self::new(store);

        let mut restored = registry.read_store();
        let left_over = restored
            .iter()
            .all(|c| c.cached_account.is_none() && !c.imported);
        if !restored.is_empty() && left_over {
            tracing::warn!(
                "No restored credential has an account snapshot, clearing {} stale entries",
                restored.len()
            );
            for credential in &restored {
                if let Err(e) = registry.store.remove(&credential.store_key()) {
                    tracing::warn!("Failed to clear stale credential {}: {e}", credential.id());
                }
            }
            restored.clear();
        }

        tracing::info!("Restored {} credential(s)", restored.len());
        registry.set_credentials(restored);
        registry
    }

    fn read_store(&self) -> Vec<Credential> {
        let keys = match self.store.list_keys() {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!("Failed to list stored credentials: {e}");
                return Vec::new();
            }
        };

        let mut credentials: Vec<Credential> = Vec::new();
        for key in keys {
            let credential = match self.store.get(&key) {
                Ok(Some(blob)) => decode_credential(&blob),
                Ok(None) => continue,
                Err(e) => Err(e),
            };
            match credential {
                Ok(credential) if credentials.iter().any(|c| c.same_identity(&credential)) => {
                    tracing::warn!("Ignoring duplicate credential {} under {key}", credential.id());
                }
                Ok(credential) => credentials.push(credential),
                Err(e) => tracing::warn!("Skipping unreadable credential {key}: {e}"),
            }
        }
        credentials
    }

    // ==================== Queries ====================

    /// The active credential (head of the sequence)
    pub fn active(&self) -> Option<&Credential> {
        self.credentials.first()
    }

    /// All credentials, most recently active first
    pub fn credentials(&self) -> &[Credential] {
        &self.credentials
    }

    /// Number of credentials
    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    /// Whether no account is signed in
    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }

    /// Find a credential by identity
    pub fn get(&self, id: &CredentialId) -> Option<&Credential> {
        self.credentials
            .iter()
            .find(|c| c.matches(&id.user_id, &id.domain))
    }

    /// Find the credential that owns a user access token
    pub fn credential_matching_token(&self, access_token: &str) -> Option<&Credential> {
        self.credentials
            .iter()
            .find(|c| c.user_access_token == access_token)
    }

    /// Watch the active credential.
    ///
    /// Receivers are notified only when the active account changes; the value
    /// itself is kept current on every mutation.
    pub fn subscribe_active(&self) -> watch::Receiver<Option<Credential>> {
        self.active_tx.subscribe()
    }

    /// Watch the whole credential sequence (notified on every mutation)
    pub fn subscribe_credentials(&self) -> watch::Receiver<Vec<Credential>> {
        self.credentials_tx.subscribe()
    }

    // ==================== Activation ====================

    /// Make an existing account active. Returns `false` if it is unknown.
    pub fn activate(&mut self, user_id: &str, domain: &str) -> bool {
        let Some(index) = self
            .credentials
            .iter()
            .position(|c| c.matches(user_id, domain))
        else {
            tracing::debug!("No credential for {user_id}@{domain} to activate");
            return false;
        };

        let activated_at = self.next_activation_time();
        let mut credentials = self.credentials.clone();
        let credential = credentials.remove(index).with_activated_at(activated_at);
        credentials.insert(0, credential);
        self.set_credentials(credentials);
        true
    }

    /// Activate `credential`, inserting it first if it is not known yet
    pub fn activate_or_insert(&mut self, credential: Credential) {
        if self.activate(&credential.user_id, &credential.domain) {
            return;
        }

        let (user_id, domain) = (credential.user_id.clone(), credential.domain.clone());
        let mut credentials = self.credentials.clone();
        credentials.insert(0, credential);
        self.set_credentials(credentials);
        self.activate(&user_id, &domain);
    }

    /// Activate the account owning `access_token`
    pub fn activate_existing_token(&mut self, access_token: &str) -> Option<Credential> {
        let id = self.credential_matching_token(access_token)?.id();
        if !self.activate(&id.user_id, &id.domain) {
            return None;
        }
        self.active().cloned()
    }

    /// Activation timestamps strictly increase so the newest activation always
    /// sorts first, even within one clock tick.
    fn next_activation_time(&self) -> DateTime<Utc> {
        let now = Utc::now();
        self.credentials
            .iter()
            .map(|c| c.activated_at + TimeDelta::nanoseconds(1))
            .max()
            .map_or(now, |floor| floor.max(now))
    }

    // ==================== Updates ====================

    /// Replace every credential matching `predicate` with `transform(old)`.
    /// Returns how many were replaced.
    pub fn update_in_place(
        &mut self,
        predicate: impl Fn(&Credential) -> bool,
        transform: impl Fn(Credential) -> Credential,
    ) -> usize {
        let mut replaced = 0;
        let credentials = self
            .credentials
            .iter()
            .cloned()
            .map(|credential| {
                if predicate(&credential) {
                    replaced += 1;
                    transform(credential)
                } else {
                    credential
                }
            })
            .collect();

        if replaced > 0 {
            self.set_credentials(credentials);
        }
        replaced
    }

    /// Store fresh instance metadata on every account of `domain`
    pub fn update_instance(&mut self, domain: &str, instance: &InstanceMetadata) -> usize {
        self.update_in_place(
            |c| c.domain == domain,
            |c| c.with_instance(instance.clone()),
        )
    }

    /// Store translation languages on every account of `domain`
    pub fn update_translation_languages(
        &mut self,
        domain: &str,
        languages: &BTreeMap<String, Vec<String>>,
    ) -> usize {
        self.update_in_place(
            |c| c.domain == domain,
            |c| c.with_translation_languages(languages.clone()),
        )
    }

    /// Record the server-side creation time of exactly `outdated`.
    ///
    /// Matches by full equality: if the credential changed since the caller
    /// read it, nothing is updated.
    pub fn update_account_created_at(
        &mut self,
        created_at: DateTime<Utc>,
        outdated: &Credential,
    ) -> bool {
        self.update_in_place(|c| c == outdated, |c| c.with_account_created_at(created_at)) > 0
    }

    /// Store a fresh account snapshot for one account
    pub fn update_cached_account(&mut self, id: &CredentialId, account: &AccountSnapshot) -> bool {
        self.update_in_place(
            |c| c.matches(&id.user_id, &id.domain),
            |c| c.with_cached_account(account.clone()),
        ) > 0
    }

    /// Verify every account against its server and store the snapshots.
    ///
    /// Best-effort: failures are logged and leave the old snapshot in place.
    /// Returns how many accounts were refreshed.
    pub async fn refresh_cached_accounts<A, F>(&mut self, api_for: F) -> usize
    where
        A: MastodonApi,
        F: Fn(&Credential) -> A,
    {
        let mut refreshed = 0;
        for credential in self.credentials.clone() {
            let api = api_for(&credential);
            match api.verify_credentials().await {
                Ok(account) => {
                    if self.update_cached_account(&credential.id(), &account) {
                        refreshed += 1;
                    }
                }
                Err(e) => tracing::warn!("Failed to verify {}: {e:#}", credential.id()),
            }
        }
        refreshed
    }

    /// Replace the whole sequence (used by legacy migration)
    pub(crate) fn replace_all(&mut self, credentials: Vec<Credential>) {
        self.set_credentials(credentials);
    }

    // ==================== Removal ====================

    /// Delete an account from the store, then from memory.
    ///
    /// If the store deletion fails the registry is left unchanged.
    pub async fn delete(&mut self, credential: &Credential) -> Result<()> {
        self.persister.remove(&credential.store_key()).await?;

        let credentials = self
            .credentials
            .iter()
            .filter(|c| !c.same_identity(credential))
            .cloned()
            .collect();
        self.set_credentials(credentials);
        Ok(())
    }

    /// Sign an account out: delete it, cancel its server-side push
    /// subscription and purge its cached feeds.
    ///
    /// Only the deletion can fail the call; cleanup failures are logged.
    pub async fn sign_out<A: MastodonApi>(
        &mut self,
        credential: &Credential,
        api: &A,
        feed_cache: Option<&Database>,
    ) -> Result<()> {
        if self.get(&credential.id()).is_none() {
            return Err(Error::not_found(credential.id().to_string()));
        }

        self.delete(credential).await?;

        if let Err(e) = api.cancel_subscription().await {
            tracing::warn!("Failed to cancel subscription for {}: {e:#}", credential.id());
        }

        if let Some(db) = feed_cache {
            match db.purge_credential(&credential.store_key()) {
                Ok(count) => tracing::debug!("Purged {count} cached records for {}", credential.id()),
                Err(e) => tracing::warn!("Failed to purge feed cache for {}: {e}", credential.id()),
            }
        }

        tracing::info!("Signed out {}", credential.id());
        Ok(())
    }

    /// Wait until every queued write has reached the store
    pub async fn flush(&self) {
        self.persister.flush().await;
    }

    // ==================== Pipeline ====================

    fn set_credentials(&mut self, mut credentials: Vec<Credential>) {
        credentials.sort_by(|a, b| b.activated_at.cmp(&a.activated_at));
        self.credentials = credentials;

        let head = self.credentials.first().cloned();
        self.active_tx.send_if_modified(|active| {
            let changed = match (active.as_ref(), head.as_ref()) {
                (Some(old), Some(new)) => !old.same_identity(new),
                (None, None) => false,
                _ => true,
            };
            *active = head;
            changed
        });

        self.credentials_tx.send_replace(self.credentials.clone());
        self.persister.write(&self.credentials);
    }
}
