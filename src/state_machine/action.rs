//! Actions that drive state transitions

use super::state::{AppState, Conversation, Message, PreferencesPatch};

/// Every way the application state can change.
///
/// Actions carry fully built entities. Ids and timestamps are assigned by the
/// engine before dispatch so that [`super::transition`] stays pure.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Replace the whole state with a previously persisted snapshot
    Hydrate(Box<AppState>),
    StartConversation {
        conversation: Conversation,
    },
    /// Point the active id somewhere. Not checked against the conversation list.
    SetActive {
        conversation_id: String,
    },
    AddMessage {
        conversation_id: String,
        message: Message,
    },
    UpdatePreferences(PreferencesPatch),
    /// Drop every conversation and start over with `fresh`
    ClearHistory {
        fresh: Conversation,
    },
    DeleteConversation {
        conversation_id: String,
    },
    MarkSpoken {
        conversation_id: String,
        message_id: String,
    },
    RenameConversation {
        conversation_id: String,
        title: String,
    },
}

impl Action {
    /// Stable name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Action::Hydrate(_) => "hydrate",
            Action::StartConversation { .. } => "start-conversation",
            Action::SetActive { .. } => "set-active",
            Action::AddMessage { .. } => "add-message",
            Action::UpdatePreferences(_) => "update-preferences",
            Action::ClearHistory { .. } => "clear-history",
            Action::DeleteConversation { .. } => "delete-conversation",
            Action::MarkSpoken { .. } => "mark-spoken",
            Action::RenameConversation { .. } => "rename-conversation",
        }
    }
}
