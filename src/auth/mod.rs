//! Authentication module
//!
//! Credentials for every signed-in account live in a [`CredentialStore`]
//! (encrypted files on disk in production) and are mirrored in memory by the
//! [`SessionRegistry`], which owns the notion of the active account.

mod keyring;
mod memory;
pub mod migration;
mod persist;
mod registry;

pub use keyring::EncryptedFileStore;
pub use memory::MemoryStore;
pub use registry::SessionRegistry;

use crate::error::{Error, Result};
use crate::models::Credential;

/// Secure key/value persistence for serialized credentials.
///
/// Every call is independent: a `put` replaces exactly one key atomically and
/// never touches the others.
pub trait CredentialStore: Send + Sync {
    /// Store `blob` under `key`, replacing any previous value
    fn put(&self, key: &str, blob: &[u8]) -> Result<()>;

    /// Read the blob stored under `key`
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete `key`; deleting a missing key is not an error
    fn remove(&self, key: &str) -> Result<()>;

    /// All keys currently stored
    fn list_keys(&self) -> Result<Vec<String>>;
}

/// Serialize a credential into a store blob
pub fn encode_credential(credential: &Credential) -> Result<Vec<u8>> {
    serde_json::to_vec(credential).map_err(|e| Error::store(format!("encode failed: {e}")))
}

/// Deserialize a store blob into a credential
pub fn decode_credential(blob: &[u8]) -> Result<Credential> {
    serde_json::from_slice(blob).map_err(|e| Error::decode(e.to_string()))
}
