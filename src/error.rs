//! Error types for the session and feed core

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the session registry, stores and feed loaders.
#[derive(Error, Debug)]
pub enum Error {
    /// Secure store read/write/delete failure
    #[error("Store error: {0}")]
    Store(String),

    /// A persisted credential could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Any API call failure
    #[error("Network error: {0}")]
    Network(String),

    /// No credential matches the requested account
    #[error("Not found: {0}")]
    NotFound(String),

    /// A load state machine was asked to make a transition it does not allow
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition {
        /// State the machine was in
        from: &'static str,
        /// State that was requested
        to: &'static str,
    },

    /// `SQLite` errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a store error.
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create a decode error.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Wrap an API client failure, keeping the whole context chain.
    pub fn network(err: &anyhow::Error) -> Self {
        Self::Network(format!("{err:#}"))
    }

    /// Create a not-found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
