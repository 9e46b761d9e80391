//! Credential model for signed-in accounts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::AccountSnapshot;

/// Identity of a credential: one user on one server.
///
/// Two credentials with the same identity are the same account, even when
/// their tokens or timestamps differ.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CredentialId {
    /// Server domain (e.g. `mastodon.social`)
    pub domain: String,
    /// Server-side user id
    pub user_id: String,
}

impl CredentialId {
    /// Create an identity from a domain and user id
    pub fn new(domain: &str, user_id: &str) -> Self {
        Self {
            domain: domain.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

impl std::fmt::Display for CredentialId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.user_id, self.domain)
    }
}

/// Server instance metadata cached with a credential
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    /// Instance title
    pub title: String,
    /// Software version string reported by the server
    pub version: String,
    /// Maximum characters per status, if advertised
    #[serde(default)]
    pub max_status_characters: Option<u32>,
    /// Source language → supported target languages
    #[serde(default)]
    pub translation_languages: BTreeMap<String, Vec<String>>,
}

/// Stored authentication material and cached profile for one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Local identifier (stable across token refreshes)
    pub identifier: Uuid,
    /// Server domain without scheme
    pub domain: String,
    /// Server-side user id
    pub user_id: String,
    /// Username on the server
    pub username: String,
    /// App-level access token (client credentials grant)
    pub app_access_token: String,
    /// User access token used for API requests
    pub user_access_token: String,
    /// OAuth client id
    pub client_id: String,
    /// OAuth client secret
    pub client_secret: String,
    /// When the credential was created
    pub created_at: DateTime<Utc>,
    /// When the credential was last updated
    pub updated_at: DateTime<Utc>,
    /// When the account was last made active
    pub activated_at: DateTime<Utc>,
    /// When the server-side account was created
    #[serde(default)]
    pub account_created_at: Option<DateTime<Utc>>,
    /// Last known account snapshot
    #[serde(default)]
    pub cached_account: Option<AccountSnapshot>,
    /// Last known instance metadata
    #[serde(default)]
    pub instance: Option<InstanceMetadata>,
    /// Imported from the legacy database and not verified since
    #[serde(default)]
    pub imported: bool,
}

impl Credential {
    /// Create a credential for a freshly signed-in user
    pub fn new(domain: &str, user_id: &str, username: &str, user_access_token: &str) -> Self {
        let now = Utc::now();
        Self {
            identifier: Uuid::new_v4(),
            domain: normalize_domain(domain),
            user_id: user_id.to_string(),
            username: username.to_string(),
            app_access_token: String::new(),
            user_access_token: user_access_token.to_string(),
            client_id: String::new(),
            client_secret: String::new(),
            created_at: now,
            updated_at: now,
            activated_at: now,
            account_created_at: None,
            cached_account: None,
            instance: None,
            imported: false,
        }
    }

    /// Identity of this credential
    pub fn id(&self) -> CredentialId {
        CredentialId::new(&self.domain, &self.user_id)
    }

    /// Whether `other` is the same account, ignoring tokens and timestamps
    pub fn same_identity(&self, other: &Self) -> bool {
        self.domain == other.domain && self.user_id == other.user_id
    }

    /// Whether this credential belongs to `user_id` on `domain`
    pub fn matches(&self, user_id: &str, domain: &str) -> bool {
        self.user_id == user_id && self.domain == domain
    }

    /// Get the key used for the credential store and per-account caches
    pub fn store_key(&self) -> String {
        format!("tusk:{}:{}", self.domain, self.user_id)
    }

    /// Base URL of the account's server
    pub fn base_url(&self) -> String {
        format!("https://{}", self.domain)
    }

    /// Get the display handle (`@user@domain`)
    pub fn handle(&self) -> String {
        self.cached_account.as_ref().map_or_else(
            || format!("@{}@{}", self.username, self.domain),
            |account| account.full_handle(&self.domain),
        )
    }

    /// Copy stamped with a new activation time
    pub fn with_activated_at(mut self, activated_at: DateTime<Utc>) -> Self {
        self.activated_at = activated_at;
        self.updated_at = Utc::now();
        self
    }

    /// Copy with new instance metadata
    pub fn with_instance(mut self, instance: InstanceMetadata) -> Self {
        // Translation languages are fetched separately and survive a refresh
        let languages = self
            .instance
            .take()
            .map(|old| old.translation_languages)
            .unwrap_or_default();
        self.instance = Some(InstanceMetadata {
            translation_languages: if instance.translation_languages.is_empty() {
                languages
            } else {
                instance.translation_languages
            },
            ..instance
        });
        self.updated_at = Utc::now();
        self
    }

    /// Copy with new translation languages
    pub fn with_translation_languages(mut self, languages: BTreeMap<String, Vec<String>>) -> Self {
        self.instance
            .get_or_insert_with(InstanceMetadata::default)
            .translation_languages = languages;
        self.updated_at = Utc::now();
        self
    }

    /// Copy with a new server-side account creation time
    pub fn with_account_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.account_created_at = Some(created_at);
        self.updated_at = Utc::now();
        self
    }

    /// Copy with a fresh account snapshot
    pub fn with_cached_account(mut self, account: AccountSnapshot) -> Self {
        if self.account_created_at.is_none() {
            self.account_created_at = account.created_at;
        }
        self.username.clone_from(&account.username);
        self.cached_account = Some(account);
        self.imported = false;
        self.updated_at = Utc::now();
        self
    }
}

/// Strip scheme and trailing slashes from a server address
pub(crate) fn normalize_domain(domain: &str) -> String {
    domain
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_ignores_tokens() {
        let a = Credential::new("mastodon.social", "1", "alice", "token-a");
        let mut b = a.clone();
        b.user_access_token = "token-b".to_string();

        assert!(a.same_identity(&b));
        assert_ne!(a, b);
        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn test_domain_is_normalized() {
        let credential = Credential::new("https://Mastodon.Social/", "1", "alice", "t");
        assert_eq!(credential.domain, "mastodon.social");
        assert_eq!(credential.base_url(), "https://mastodon.social");
        assert_eq!(credential.store_key(), "tusk:mastodon.social:1");
    }

    #[test]
    fn test_instance_refresh_keeps_translation_languages() {
        let mut languages = BTreeMap::new();
        languages.insert("en".to_string(), vec!["de".to_string()]);

        let credential = Credential::new("mastodon.social", "1", "alice", "t")
            .with_translation_languages(languages.clone())
            .with_instance(InstanceMetadata {
                title: "Mastodon".to_string(),
                version: "4.3.0".to_string(),
                ..InstanceMetadata::default()
            });

        let instance = credential.instance.unwrap();
        assert_eq!(instance.title, "Mastodon");
        assert_eq!(instance.translation_languages, languages);
    }

    #[test]
    fn test_decodes_without_optional_fields() {
        let credential = Credential::new("mastodon.social", "1", "alice", "t");
        let mut value = serde_json::to_value(&credential).unwrap();
        let object = value.as_object_mut().unwrap();
        object.remove("cached_account");
        object.remove("instance");
        object.remove("account_created_at");
        object.remove("imported");

        let decoded: Credential = serde_json::from_value(value).unwrap();
        assert!(decoded.cached_account.is_none());
        assert_eq!(decoded, credential);
    }
}
