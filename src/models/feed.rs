//! Feed kinds, records and pages

use serde::{Deserialize, Serialize};

use super::{AccountSnapshot, Notification, Status};

/// Anything that can be de-duplicated by a stable key.
///
/// Identity is deliberately narrower than equality: two records with the same
/// identity are the same server item even if their counters differ.
pub trait Identity {
    /// Stable key of the underlying item
    fn identity(&self) -> &str;
}

impl Identity for String {
    fn identity(&self) -> &str {
        self
    }
}

impl Identity for Status {
    fn identity(&self) -> &str {
        &self.id
    }
}

impl Identity for Notification {
    fn identity(&self) -> &str {
        &self.id
    }
}

impl Identity for AccountSnapshot {
    fn identity(&self) -> &str {
        &self.id
    }
}

/// Which logical feed a page or record belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedKind {
    /// Home timeline
    #[default]
    Home,
    /// Local timeline of the account's server
    Local,
    /// Federated timeline
    Federated,
    /// All notifications
    #[serde(rename = "notifications")]
    NotificationAll,
    /// Mentions only
    #[serde(rename = "mentions")]
    NotificationMentions,
    /// Notifications caused by one account
    NotificationAccount(String),
    /// Statuses posted by one account
    AccountStatuses(String),
}

impl FeedKind {
    /// Parse from a CLI/config string
    ///
    /// Accepts `home`, `local`, `federated`, `notifications`, `mentions`,
    /// `notifications:<account id>` and `account:<account id>`.
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(id) = s.strip_prefix("notifications:") {
            return (!id.is_empty()).then(|| Self::NotificationAccount(id.to_string()));
        }
        if let Some(id) = s.strip_prefix("account:") {
            return (!id.is_empty()).then(|| Self::AccountStatuses(id.to_string()));
        }
        match s.to_lowercase().as_str() {
            "home" => Some(Self::Home),
            "local" => Some(Self::Local),
            "federated" | "public" => Some(Self::Federated),
            "notifications" | "notifs" => Some(Self::NotificationAll),
            "mentions" => Some(Self::NotificationMentions),
            _ => None,
        }
    }

    /// Stable name, also used as the cache key
    pub fn name(&self) -> String {
        match self {
            Self::Home => "home".to_string(),
            Self::Local => "local".to_string(),
            Self::Federated => "federated".to_string(),
            Self::NotificationAll => "notifications".to_string(),
            Self::NotificationMentions => "mentions".to_string(),
            Self::NotificationAccount(id) => format!("notifications:{id}"),
            Self::AccountStatuses(id) => format!("account:{id}"),
        }
    }

    /// Whether the on-disk feed cache keeps this feed
    pub const fn is_cached(&self) -> bool {
        matches!(
            self,
            Self::Home | Self::NotificationAll | Self::NotificationMentions
        )
    }
}

impl std::fmt::Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

/// Opaque server pagination token (a `max_id`)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Cursor(pub String);

impl Cursor {
    /// Create a cursor from a raw token
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Raw token
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One page of server results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items in server order (newest first)
    pub items: Vec<T>,
    /// Cursor for the following (older) page, if the server advertised one
    pub next_cursor: Option<Cursor>,
}

impl<T> Page<T> {
    /// Create a page
    pub const fn new(items: Vec<T>, next_cursor: Option<Cursor>) -> Self {
        Self { items, next_cursor }
    }

    /// Create the final page of a listing
    pub const fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_cursor: None,
        }
    }

    /// Transform every item
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            next_cursor: self.next_cursor,
        }
    }
}

/// Underlying domain item of a feed record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FeedItem {
    /// A status from a timeline
    Status(Status),
    /// A notification
    Notification(Notification),
}

impl Identity for FeedItem {
    fn identity(&self) -> &str {
        match self {
            Self::Status(status) => status.identity(),
            Self::Notification(notification) => notification.identity(),
        }
    }
}

/// A feed item tagged with the feed that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRecord {
    /// Feed that produced the item
    pub kind: FeedKind,
    /// The item itself
    pub item: FeedItem,
}

impl FeedRecord {
    /// Wrap a status
    pub const fn status(kind: FeedKind, status: Status) -> Self {
        Self {
            kind,
            item: FeedItem::Status(status),
        }
    }

    /// Wrap a notification
    pub const fn notification(kind: FeedKind, notification: Notification) -> Self {
        Self {
            kind,
            item: FeedItem::Notification(notification),
        }
    }

    /// The status carried by this record (for notifications, the status the
    /// notification refers to)
    pub const fn as_status(&self) -> Option<&Status> {
        match &self.item {
            FeedItem::Status(status) => Some(status),
            FeedItem::Notification(notification) => notification.status.as_ref(),
        }
    }

    /// The notification carried by this record
    pub const fn as_notification(&self) -> Option<&Notification> {
        match &self.item {
            FeedItem::Notification(notification) => Some(notification),
            FeedItem::Status(_) => None,
        }
    }
}

impl Identity for FeedRecord {
    fn identity(&self) -> &str {
        self.item.identity()
    }
}
