//! Background persistence of the credential sequence.
//!
//! The registry hands snapshots to a worker task and moves on; the worker
//! writes them to the store in the order they were sent. Removals go through
//! the same queue so a pending write can never resurrect a deleted key.

use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

use super::{CredentialStore, encode_credential};
use crate::error::{Error, Result};
use crate::models::Credential;

/// Message for the persistence task
enum PersistMessage {
    /// Write every credential of a snapshot
    Write(Vec<Credential>),
    /// Remove one key and report the outcome
    Remove {
        key: String,
        reply: oneshot::Sender<Result<()>>,
    },
    /// Acknowledge once everything queued before has been written
    Flush(oneshot::Sender<()>),
}

/// Handle to the persistence task
pub(crate) struct Persister {
    sender: mpsc::UnboundedSender<PersistMessage>,
}

impl Persister {
    /// Spawn the persistence task.
    ///
    /// Must be called from within a Tokio runtime.
    pub(crate) fn spawn(store: Arc<dyn CredentialStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(persist_task(rx, store));
        Self { sender: tx }
    }

    /// Queue a snapshot for writing (fire-and-forget)
    pub(crate) fn write(&self, credentials: &[Credential]) {
        if self
            .sender
            .send(PersistMessage::Write(credentials.to_vec()))
            .is_err()
        {
            tracing::warn!("Credential persistence task is gone, snapshot dropped");
        }
    }

    /// Remove a key after every queued write has landed
    pub(crate) async fn remove(&self, key: &str) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.sender
            .send(PersistMessage::Remove {
                key: key.to_string(),
                reply,
            })
            .map_err(|_| Error::store("credential persistence task is gone"))?;
        rx.await
            .map_err(|_| Error::store("credential persistence task stopped"))?
    }

    /// Wait until every queued write has been applied
    pub(crate) async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(PersistMessage::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

/// Background task that applies persistence messages in order.
async fn persist_task(
    mut rx: mpsc::UnboundedReceiver<PersistMessage>,
    store: Arc<dyn CredentialStore>,
) {
    while let Some(message) = rx.recv().await {
        match message {
            PersistMessage::Write(credentials) => {
                let store = Arc::clone(&store);
                let written = tokio::task::spawn_blocking(move || write_all(&*store, &credentials));
                if let Err(e) = written.await {
                    tracing::error!("Credential write task failed: {e}");
                }
            }
            PersistMessage::Remove { key, reply } => {
                let store = Arc::clone(&store);
                let removed = tokio::task::spawn_blocking(move || store.remove(&key))
                    .await
                    .unwrap_or_else(|e| Err(Error::store(format!("remove task failed: {e}"))));
                let _ = reply.send(removed);
            }
            PersistMessage::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    tracing::debug!("Credential persistence task shutting down");
}

fn write_all(store: &dyn CredentialStore, credentials: &[Credential]) {
    for credential in credentials {
        let result = encode_credential(credential).and_then(|blob| store.put(&credential.store_key(), &blob));
        if let Err(e) = result {
            tracing::warn!("Failed to persist {}: {e}", credential.id());
        }
    }
}
