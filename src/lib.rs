//! # Tusk 🐘
//!
//! Multi-account session engine and paginated feed loading for Mastodon.
//!
//! ## Overview
//!
//! Tusk keeps every signed-in Mastodon account in one ordered registry with a
//! single active account, persists the credentials encrypted at rest, keeps
//! the active account's relationship sets fresh in the background, and drives
//! cursor-paginated feeds through a small load state machine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SessionRegistry                        │
//! │  Ordered credentials, active = head, every mutation         │
//! │  persisted and republished                                  │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//! ┌─────────────────┐ ┌─────────────────┐ ┌─────────────────┐
//! │ CredentialStore │ │  Relationship   │ │      Feeds      │
//! │                 │ │      sync       │ │                 │
//! │ • Encrypted     │ │ • Following     │ │ • Controller    │
//! │   files         │ │ • Blocked       │ │ • State machine │
//! │ • In memory     │ │ • Requests      │ │ • Page loaders  │
//! └─────────────────┘ └─────────────────┘ └─────────────────┘
//!                              │                   │
//!                              └─────────┬─────────┘
//!                                        ▼
//!                   ┌─────────────────┐ ┌─────────────────┐
//!                   │       API       │ │    Database     │
//!                   │                 │ │                 │
//!                   │ • Mastodon REST │ │ • Feed cache    │
//!                   │ • OAuth         │ │ • App state     │
//!                   └─────────────────┘ └─────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`api`] — Mastodon API client and the trait the core consumes
//! - [`auth`] — Credential stores, the session registry, legacy migration
//! - [`config`] — Configuration management
//! - [`db`] — `SQLite` feed cache and app state
//! - [`feed`] — Feed controller and load state machine
//! - [`models`] — Credentials, statuses, notifications, feed records
//! - [`sync`] — Relationship cache and its background refresh
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tusk::auth::{EncryptedFileStore, SessionRegistry};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(EncryptedFileStore::open()?);
//!     let registry = SessionRegistry::restore(store);
//!     if let Some(active) = registry.active() {
//!         println!("Active: {}", active.handle());
//!     }
//!     Ok(())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/tusk/0.1.0")]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![allow(clippy::unused_async)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::if_not_else)]
#![allow(clippy::single_match_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::trivially_copy_pass_by_ref)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::use_self)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::should_implement_trait)]
#![allow(clippy::similar_names)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::future_not_send)]

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod feed;
pub mod models;
pub mod paths;
pub mod sync;

// Re-export main types for convenience
pub use auth::{CredentialStore, EncryptedFileStore, MemoryStore, SessionRegistry};
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use feed::{FeedController, FeedStateMachine, LoadState, PageLoader};
pub use models::{Credential, CredentialId, Cursor, FeedKind, FeedRecord, Page};
pub use sync::{RelationshipCache, RelationshipRefresher};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Repository URL
pub const REPO_URL: &str = "https://github.com/ricardodantas/tusk";
