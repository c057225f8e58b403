//! Pure state transition function

use super::{Action, AppState, Effect};

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    /// The committed state, or `None` when the action changed nothing
    pub new_state: Option<AppState>,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    fn unchanged() -> Self {
        Self {
            new_state: None,
            effects: vec![],
        }
    }

    fn committed(state: AppState) -> Self {
        Self {
            new_state: Some(state),
            effects: vec![Effect::PersistState, Effect::NotifySubscribers],
        }
    }

    pub fn is_committed(&self) -> bool {
        self.new_state.is_some()
    }
}

/// Pure transition function
///
/// Given the same state and action it always produces the same result and
/// performs no I/O. Actions that address a conversation or message which does
/// not exist leave the state untouched, except delete, which still moves the
/// active id to the first conversation.
pub fn transition(state: &AppState, action: Action) -> TransitionResult {
    match action {
        Action::Hydrate(snapshot) => TransitionResult::committed(*snapshot),

        Action::StartConversation { conversation } => {
            let mut next = state.clone();
            next.active_conversation_id = Some(conversation.id.clone());
            next.conversations.insert(0, conversation);
            TransitionResult::committed(next)
        }

        // Deliberately unchecked: the id may not name any conversation.
        Action::SetActive { conversation_id } => {
            if state.active_conversation_id.as_deref() == Some(conversation_id.as_str()) {
                return TransitionResult::unchanged();
            }
            let mut next = state.clone();
            next.active_conversation_id = Some(conversation_id);
            TransitionResult::committed(next)
        }

        Action::AddMessage {
            conversation_id,
            message,
        } => {
            let Some(index) = position_of(state, &conversation_id) else {
                return TransitionResult::unchanged();
            };
            let mut next = state.clone();
            let conversation = &mut next.conversations[index];
            conversation.updated_at = message.timestamp;
            conversation.messages.push(message);
            TransitionResult::committed(next)
        }

        Action::UpdatePreferences(patch) => {
            let merged = patch.apply(&state.preferences);
            if merged == state.preferences {
                return TransitionResult::unchanged();
            }
            let mut next = state.clone();
            next.preferences = merged;
            TransitionResult::committed(next)
        }

        Action::ClearHistory { fresh } => {
            let mut next = state.clone();
            next.active_conversation_id = Some(fresh.id.clone());
            next.conversations = vec![fresh];
            TransitionResult::committed(next)
        }

        // The list never goes empty. Deleting the last conversation keeps it but
        // leaves nothing active; any other delete activates the first remaining.
        Action::DeleteConversation { conversation_id } => {
            let remaining: Vec<_> = state
                .conversations
                .iter()
                .filter(|c| c.id != conversation_id)
                .cloned()
                .collect();
            let active = remaining.first().map(|c| c.id.clone());

            let mut next = state.clone();
            if !remaining.is_empty() {
                next.conversations = remaining;
            }
            next.active_conversation_id = active;
            if next == *state {
                return TransitionResult::unchanged();
            }
            TransitionResult::committed(next)
        }

        Action::MarkSpoken {
            conversation_id,
            message_id,
        } => {
            let Some(conv_index) = position_of(state, &conversation_id) else {
                return TransitionResult::unchanged();
            };
            let Some(msg_index) = state.conversations[conv_index]
                .messages
                .iter()
                .position(|m| m.id == message_id)
            else {
                return TransitionResult::unchanged();
            };
            if state.conversations[conv_index].messages[msg_index].is_spoken() {
                return TransitionResult::unchanged();
            }
            let mut next = state.clone();
            next.conversations[conv_index].messages[msg_index].spoken = Some(true);
            TransitionResult::committed(next)
        }

        Action::RenameConversation {
            conversation_id,
            title,
        } => {
            let Some(index) = position_of(state, &conversation_id) else {
                return TransitionResult::unchanged();
            };
            if state.conversations[index].title == title {
                return TransitionResult::unchanged();
            }
            let mut next = state.clone();
            next.conversations[index].title = title;
            TransitionResult::committed(next)
        }
    }
}

fn position_of(state: &AppState, conversation_id: &str) -> Option<usize> {
    state
        .conversations
        .iter()
        .position(|c| c.id == conversation_id)
}
