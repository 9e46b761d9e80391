//! Account snapshot cached alongside a credential

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A server-side account as last seen by `verify_credentials`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Server-side account id
    pub id: String,
    /// Local username (without domain)
    pub username: String,
    /// Account handle relative to the server (`user` or `user@remote`)
    pub acct: String,
    /// Display name (for UI)
    pub display_name: String,
    /// Avatar URL
    #[serde(default)]
    pub avatar: Option<String>,
    /// When the account was created on the server
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Followers count at snapshot time
    #[serde(default)]
    pub followers_count: u64,
    /// Following count at snapshot time
    #[serde(default)]
    pub following_count: u64,
}

impl AccountSnapshot {
    /// Create a minimal snapshot
    pub fn new(id: &str, username: &str) -> Self {
        Self {
            id: id.to_string(),
            username: username.to_string(),
            acct: username.to_string(),
            display_name: username.to_string(),
            avatar: None,
            created_at: None,
            followers_count: 0,
            following_count: 0,
        }
    }

    /// Get the full handle with the server domain (`@user@domain`)
    pub fn full_handle(&self, domain: &str) -> String {
        if self.acct.contains('@') {
            format!("@{}", self.acct)
        } else {
            format!("@{}@{}", self.acct, domain)
        }
    }
}
