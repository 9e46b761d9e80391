//! Notification model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountSnapshot, Status};

/// Kind of notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    /// Someone mentioned you
    Mention,
    /// Someone boosted your status
    Reblog,
    /// Someone favourited your status
    Favourite,
    /// Someone followed you
    Follow,
    /// Someone requested to follow you
    FollowRequest,
    /// A poll you voted in or created has ended
    Poll,
    /// Someone you enabled notifications for has posted
    Status,
    /// A status you interacted with has been edited
    Update,
    /// Anything this client does not know about
    #[default]
    #[serde(other)]
    Other,
}

impl NotificationType {
    /// Parse from the server's `type` string
    pub fn from_str(s: &str) -> Self {
        match s {
            "mention" => Self::Mention,
            "reblog" => Self::Reblog,
            "favourite" => Self::Favourite,
            "follow" => Self::Follow,
            "follow_request" => Self::FollowRequest,
            "poll" => Self::Poll,
            "status" => Self::Status,
            "update" => Self::Update,
            _ => Self::Other,
        }
    }

    /// Short label for list display
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Mention => "mentioned you",
            Self::Reblog => "boosted",
            Self::Favourite => "favourited",
            Self::Follow => "followed you",
            Self::FollowRequest => "requested to follow you",
            Self::Poll => "poll ended",
            Self::Status => "posted",
            Self::Update => "edited",
            Self::Other => "notified you",
        }
    }
}

/// A notification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Server-side notification id
    pub id: String,
    /// What happened
    pub kind: NotificationType,
    /// Who caused it
    pub account: AccountSnapshot,
    /// The status involved, if any
    pub status: Option<Status>,
    /// When it happened
    pub created_at: DateTime<Utc>,
}
