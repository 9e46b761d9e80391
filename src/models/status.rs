//! Status model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A status as it appears in a feed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Server-side id of the feed entry (the boost itself, for boosts)
    pub id: String,
    /// Id of the boosted status, if this entry is a boost
    pub reblog_of: Option<String>,
    /// Author handle
    pub author_acct: String,
    /// Author display name
    pub author_name: String,
    /// Author avatar URL
    pub author_avatar: Option<String>,
    /// Post content (plain text, HTML stripped)
    pub content: String,
    /// Original HTML content
    pub content_raw: Option<String>,
    /// When the status was created
    pub created_at: DateTime<Utc>,
    /// URL to the status on the web
    pub url: Option<String>,
    /// Display name of the booster, if this entry is a boost
    pub reblogged_by: Option<String>,
    /// Number of favourites
    pub favourites_count: u32,
    /// Number of boosts
    pub reblogs_count: u32,
    /// Number of replies
    pub replies_count: u32,
    /// Whether the current user has favourited this status
    pub favourited: bool,
    /// Whether the current user has boosted this status
    pub reblogged: bool,
    /// Reply-to status ID (if this is a reply)
    pub in_reply_to_id: Option<String>,
}

impl Status {
    /// Create an empty status with the given id
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            reblog_of: None,
            author_acct: String::new(),
            author_name: String::new(),
            author_avatar: None,
            content: String::new(),
            content_raw: None,
            created_at: Utc::now(),
            url: None,
            reblogged_by: None,
            favourites_count: 0,
            reblogs_count: 0,
            replies_count: 0,
            favourited: false,
            reblogged: false,
            in_reply_to_id: None,
        }
    }

    /// Get a short preview of the content (for list display)
    pub fn preview(&self, max_chars: usize) -> String {
        let content = self.content.replace('\n', " ");
        if content.chars().count() <= max_chars {
            content
        } else {
            let cut: String = content.chars().take(max_chars.saturating_sub(3)).collect();
            format!("{cut}...")
        }
    }

    /// Get relative time string (e.g., "5m", "2h", "3d")
    pub fn relative_time(&self) -> String {
        let duration = Utc::now().signed_duration_since(self.created_at);

        if duration.num_seconds() < 60 {
            format!("{}s", duration.num_seconds().max(0))
        } else if duration.num_minutes() < 60 {
            format!("{}m", duration.num_minutes())
        } else if duration.num_hours() < 24 {
            format!("{}h", duration.num_hours())
        } else if duration.num_days() < 7 {
            format!("{}d", duration.num_days())
        } else {
            self.created_at.format("%b %d").to_string()
        }
    }
}
