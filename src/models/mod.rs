//! Data models for Tusk

mod account;
mod credential;
mod feed;
mod notification;
mod status;

pub use account::AccountSnapshot;
pub use credential::{Credential, CredentialId, InstanceMetadata};
pub use feed::{Cursor, FeedItem, FeedKind, FeedRecord, Identity, Page};
pub use notification::{Notification, NotificationType};
pub use status::Status;
