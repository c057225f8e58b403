//! Snapshot persistence
//!
//! A single background writer owns the store. The engine talks to it through
//! an unbounded channel, so saving never blocks a transition. Commands are
//! handled strictly in order, which is what keeps an early save from clobbering
//! the stored snapshot before the startup load has read it.

mod snapshot;

pub use snapshot::{decode, encode, validate, SnapshotError, SNAPSHOT_VERSION};

use crate::ids;
use crate::state_machine::AppState;
use crate::storage::KeyValueStore;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Key the snapshot lives under unless configured otherwise
pub const DEFAULT_STORAGE_KEY: &str = "astra-companion-state";

enum Command {
    Load(oneshot::Sender<Option<AppState>>),
    Save(Arc<AppState>),
    Flush(oneshot::Sender<()>),
}

/// Handle to the persistence writer task
#[derive(Clone)]
pub struct Persistence {
    commands: mpsc::UnboundedSender<Command>,
}

impl Persistence {
    /// Start the writer task. Must be called inside a tokio runtime.
    pub fn spawn(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let key = key.into();
        tracing::debug!(key = %key, "Starting persistence writer");
        let handle = tokio::spawn(run_writer(store, key, rx));
        (Self { commands: tx }, handle)
    }

    /// Queue a load of the stored snapshot.
    ///
    /// Resolves to `None` when nothing usable is stored, including when the
    /// stored data is malformed or the writer has gone away.
    pub fn request_load(&self) -> oneshot::Receiver<Option<AppState>> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Load(tx)).is_err() {
            tracing::warn!("Persistence writer stopped, load skipped");
        }
        rx
    }

    /// Queue a save. Fire-and-forget; failures are logged by the writer.
    pub fn save(&self, state: Arc<AppState>) {
        if self.commands.send(Command::Save(state)).is_err() {
            tracing::warn!("Persistence writer stopped, save dropped");
        }
    }

    /// Wait until every save queued before this call has been written
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Flush(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }
}

async fn run_writer(
    store: Arc<dyn KeyValueStore>,
    key: String,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut deferred: Option<Command> = None;

    loop {
        let command = match deferred.take() {
            Some(command) => command,
            None => match commands.recv().await {
                Some(command) => command,
                None => break,
            },
        };

        match command {
            Command::Load(reply) => {
                let snapshot = load_snapshot(store.as_ref(), &key).await;
                let _ = reply.send(snapshot);
            }
            Command::Save(mut state) => {
                // Only the newest of several queued saves needs writing
                let mut coalesced = 0usize;
                while let Ok(next) = commands.try_recv() {
                    if let Command::Save(newer) = next {
                        state = newer;
                        coalesced += 1;
                    } else {
                        deferred = Some(next);
                        break;
                    }
                }
                if coalesced > 0 {
                    tracing::trace!(coalesced, "Coalesced queued saves");
                }
                save_snapshot(store.as_ref(), &key, &state).await;
            }
            Command::Flush(reply) => {
                let _ = reply.send(());
            }
        }
    }

    tracing::debug!(key = %key, "Persistence writer stopped");
}

async fn load_snapshot(store: &dyn KeyValueStore, key: &str) -> Option<AppState> {
    let raw = match store.get(key).await {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            tracing::info!(key = %key, "No stored snapshot");
            return None;
        }
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Failed to read stored snapshot");
            return None;
        }
    };

    match decode(&raw) {
        Ok(state) => {
            tracing::info!(
                key = %key,
                conversations = state.conversations.len(),
                "Loaded stored snapshot"
            );
            Some(state)
        }
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Ignoring unusable stored snapshot");
            None
        }
    }
}

async fn save_snapshot(store: &dyn KeyValueStore, key: &str, state: &AppState) {
    let raw = match encode(state, ids::now()) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode snapshot");
            return;
        }
    };
    if let Err(e) = store.set(key, &raw).await {
        tracing::warn!(key = %key, error = %e, "Failed to save snapshot");
    }
}
