//! Application state engine
//!
//! Owns the current snapshot and is the only place that dispatches actions.
//! Every operation here resolves to exactly one transition.

use crate::ids::{self, IdGenerator};
use crate::persistence::Persistence;
use crate::state_machine::state::NEW_SESSION_TITLE;
use crate::state_machine::{
    transition, Action, AppState, Conversation, Effect, Message, PreferencesPatch, Role,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{oneshot, watch};

/// Conversation as written by [`Engine::export_conversation`]
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConversationExport<'a> {
    #[serde(flatten)]
    conversation: &'a Conversation,
    #[serde(with = "crate::ids::timestamp")]
    exported_at: DateTime<Utc>,
}

/// How startup hydration resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hydration {
    /// The load has not come back yet
    Pending,
    /// A stored snapshot replaced the in-memory state
    Hydrated,
    /// Nothing usable was stored; the seeded state stays
    NoSnapshot,
}

enum LoadState {
    Waiting(oneshot::Receiver<Option<AppState>>),
    Done(Hydration),
}

/// The single writer of application state
pub struct Engine {
    state: Arc<AppState>,
    ids: IdGenerator,
    persistence: Option<Persistence>,
    load: LoadState,
    /// Transitions committed while the startup load was outstanding
    committed_before_hydration: usize,
    updates: watch::Sender<Arc<AppState>>,
}

impl Engine {
    /// Engine backed by `persistence`.
    ///
    /// The load is queued immediately, ahead of any save. Until it resolves
    /// the engine runs on the seeded state.
    pub fn new(persistence: Persistence) -> Self {
        Self::with_id_generator(IdGenerator::new(), Some(persistence))
    }

    /// Engine without persistence; state lives only as long as the engine
    pub fn detached() -> Self {
        Self::with_id_generator(IdGenerator::new(), None)
    }

    pub fn with_id_generator(
        mut id_generator: IdGenerator,
        persistence: Option<Persistence>,
    ) -> Self {
        let state = Arc::new(AppState::seeded(&mut id_generator, ids::now()));
        let load = match &persistence {
            Some(p) => LoadState::Waiting(p.request_load()),
            None => LoadState::Done(Hydration::NoSnapshot),
        };
        let (updates, _) = watch::channel(Arc::clone(&state));
        Self {
            state,
            ids: id_generator,
            persistence,
            load,
            committed_before_hydration: 0,
            updates,
        }
    }

    // ==================== Reading ====================

    /// Current snapshot
    pub fn state(&self) -> Arc<AppState> {
        Arc::clone(&self.state)
    }

    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.state.active_conversation()
    }

    /// Receiver that sees every committed snapshot
    pub fn subscribe(&self) -> watch::Receiver<Arc<AppState>> {
        self.updates.subscribe()
    }

    pub fn hydration(&self) -> Hydration {
        match &self.load {
            LoadState::Waiting(_) => Hydration::Pending,
            LoadState::Done(outcome) => *outcome,
        }
    }

    /// Assistant messages in the active conversation that still need reading
    /// aloud. Empty unless auto-speak is enabled.
    pub fn pending_speech(&self) -> Vec<Message> {
        if !self.state.preferences.enable_auto_speak {
            return Vec::new();
        }
        self.active_conversation()
            .map(|c| {
                c.messages
                    .iter()
                    .filter(|m| m.role == Role::Assistant && !m.is_spoken())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    // ==================== Hydration ====================

    /// Wait for the startup load and apply it.
    ///
    /// Replaces the state wholesale when a snapshot was stored, discarding
    /// anything done since startup.
    pub async fn hydrate(&mut self) -> Hydration {
        let pending = LoadState::Done(Hydration::Pending);
        let receiver = match std::mem::replace(&mut self.load, pending) {
            LoadState::Waiting(receiver) => receiver,
            LoadState::Done(outcome) => {
                self.load = LoadState::Done(outcome);
                return outcome;
            }
        };
        let snapshot = receiver.await.unwrap_or(None);
        self.finish_hydration(snapshot)
    }

    /// Non-blocking variant of [`Engine::hydrate`] for event loops
    pub fn poll_hydration(&mut self) -> Hydration {
        let LoadState::Waiting(receiver) = &mut self.load else {
            return self.hydration();
        };
        match receiver.try_recv() {
            Ok(snapshot) => self.finish_hydration(snapshot),
            Err(oneshot::error::TryRecvError::Empty) => Hydration::Pending,
            Err(oneshot::error::TryRecvError::Closed) => self.finish_hydration(None),
        }
    }

    fn finish_hydration(&mut self, snapshot: Option<AppState>) -> Hydration {
        let outcome = match snapshot {
            Some(snapshot) => {
                if self.committed_before_hydration > 0 {
                    tracing::warn!(
                        discarded = self.committed_before_hydration,
                        "Hydration replaced state changed before the stored snapshot loaded"
                    );
                }
                self.load = LoadState::Done(Hydration::Hydrated);
                self.dispatch(Action::Hydrate(Box::new(snapshot)));
                Hydration::Hydrated
            }
            None => {
                self.load = LoadState::Done(Hydration::NoSnapshot);
                // The seeded state is only written once we know nothing was stored
                self.persist();
                Hydration::NoSnapshot
            }
        };
        tracing::info!(outcome = ?outcome, "Hydration finished");
        outcome
    }

    // ==================== Dispatch ====================

    /// Run one transition. Returns whether the state changed.
    pub fn dispatch(&mut self, action: Action) -> bool {
        let kind = action.kind();
        let result = transition(&self.state, action);
        let Some(new_state) = result.new_state else {
            tracing::debug!(action = kind, "Transition left state unchanged");
            return false;
        };

        if matches!(self.load, LoadState::Waiting(_)) {
            self.committed_before_hydration += 1;
        }
        self.state = Arc::new(new_state);
        tracing::debug!(action = kind, "Transition committed");

        for effect in result.effects {
            match effect {
                Effect::PersistState => self.persist(),
                Effect::NotifySubscribers => {
                    self.updates.send_replace(Arc::clone(&self.state));
                }
            }
        }
        true
    }

    fn persist(&self) {
        if let Some(persistence) = &self.persistence {
            persistence.save(Arc::clone(&self.state));
        }
    }

    // ==================== Operations ====================

    /// Start a conversation, make it active, and return it
    pub fn start_conversation(
        &mut self,
        title: impl Into<String>,
        initial_message: Option<Message>,
    ) -> Conversation {
        let conversation =
            Conversation::new(self.ids.next_id(), title, ids::now(), initial_message);
        tracing::info!(conversation_id = %conversation.id, "Starting conversation");
        self.dispatch(Action::StartConversation {
            conversation: conversation.clone(),
        });
        conversation
    }

    /// Send a user message to the active conversation
    pub fn send_message(&mut self, content: impl Into<String>) -> Message {
        self.send_message_as(content, Role::User, None)
    }

    /// Append a message to `conversation_id`, or to the active conversation,
    /// or to a freshly started one when nothing is active.
    ///
    /// The message is returned even when the target id matches nothing and
    /// the append turns into a no-op.
    pub fn send_message_as(
        &mut self,
        content: impl Into<String>,
        role: Role,
        conversation_id: Option<&str>,
    ) -> Message {
        let target = match conversation_id
            .map(String::from)
            .or_else(|| self.state.active_conversation_id.clone())
        {
            Some(id) => id,
            None => self.start_conversation(NEW_SESSION_TITLE, None).id,
        };

        let message = Message::new(self.ids.next_id(), role, content, ids::now());
        let appended = self.dispatch(Action::AddMessage {
            conversation_id: target.clone(),
            message: message.clone(),
        });
        if !appended {
            tracing::debug!(conversation_id = %target, "Message target not found");
        }
        message
    }

    pub fn set_active_conversation(&mut self, conversation_id: impl Into<String>) {
        self.dispatch(Action::SetActive {
            conversation_id: conversation_id.into(),
        });
    }

    pub fn update_preferences(&mut self, patch: PreferencesPatch) {
        self.dispatch(Action::UpdatePreferences(patch));
    }

    /// Replace every conversation with one empty "New Session"
    pub fn clear_history(&mut self) {
        let fresh =
            Conversation::new(self.ids.next_id(), NEW_SESSION_TITLE, ids::now(), None);
        tracing::info!(
            discarded = self.state.conversations.len(),
            "Clearing conversation history"
        );
        self.dispatch(Action::ClearHistory { fresh });
    }

    pub fn delete_conversation(&mut self, conversation_id: impl Into<String>) {
        self.dispatch(Action::DeleteConversation {
            conversation_id: conversation_id.into(),
        });
    }

    pub fn mark_spoken(
        &mut self,
        conversation_id: impl Into<String>,
        message_id: impl Into<String>,
    ) {
        self.dispatch(Action::MarkSpoken {
            conversation_id: conversation_id.into(),
            message_id: message_id.into(),
        });
    }

    pub fn rename_conversation(
        &mut self,
        conversation_id: impl Into<String>,
        title: impl Into<String>,
    ) {
        self.dispatch(Action::RenameConversation {
            conversation_id: conversation_id.into(),
            title: title.into(),
        });
    }

    /// Pretty-printed JSON of the conversation plus an `exportedAt` stamp.
    ///
    /// `None` when no conversation has that id.
    pub fn export_conversation(&self, conversation_id: &str) -> Option<String> {
        let conversation = self.state.conversation(conversation_id)?;
        export(conversation, ids::now())
    }

    /// Wait for every queued save to reach the store
    pub async fn flush(&self) {
        if let Some(persistence) = &self.persistence {
            persistence.flush().await;
        }
    }
}

fn export(conversation: &Conversation, exported_at: DateTime<Utc>) -> Option<String> {
    let payload = ConversationExport {
        conversation,
        exported_at,
    };
    match serde_json::to_string_pretty(&payload) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(
                conversation_id = %conversation.id,
                error = %e,
                "Failed to export conversation"
            );
            None
        }
    }
}
