//! Application state types
//!
//! Everything in here is plain data. The persisted snapshot is these types
//! serialized as camelCase JSON, so field names are part of the storage format.

use crate::ids::IdGenerator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Title of the conversation every fresh install starts with
pub const SEED_CONVERSATION_TITLE: &str = "First Companion Session";

/// Title given to conversations created implicitly or by clearing history
pub const NEW_SESSION_TITLE: &str = "New Session";

/// Assistant greeting placed in the seed conversation
pub const GREETING: &str = "Hello! I am your calm-focused companion. Ask me about well-being, \
crops, technology, or anything else on your mind.";

// ============================================================================
// Messages
// ============================================================================

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single chat message. Only `spoken` ever changes after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub role: Role,
    pub content: String,
    #[serde(with = "crate::ids::timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spoken: Option<bool>,
}

impl Message {
    pub fn new(
        id: impl Into<String>,
        role: Role,
        content: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp,
            spoken: None,
        }
    }

    pub fn is_spoken(&self) -> bool {
        self.spoken == Some(true)
    }
}

// ============================================================================
// Conversations
// ============================================================================

/// An ordered, append-only thread of messages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    pub id: String,
    pub title: String,
    #[serde(with = "crate::ids::timestamp")]
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last appended message, or `created_at` while empty
    #[serde(with = "crate::ids::timestamp")]
    pub updated_at: DateTime<Utc>,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        now: DateTime<Utc>,
        initial_message: Option<Message>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            created_at: now,
            updated_at: now,
            messages: initial_message.into_iter().collect(),
        }
    }

    pub fn message(&self, message_id: &str) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == message_id)
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

// ============================================================================
// Preferences
// ============================================================================

/// Color theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    System,
    Light,
    Dark,
}

/// User settings. Every field defaults on its own, so snapshots written
/// before a field existed still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferenceState {
    pub theme: Theme,
    #[serde(rename = "voiceURI")]
    pub voice_uri: Option<String>,
    pub voice_volume: f64,
    pub voice_rate: f64,
    pub voice_pitch: f64,
    pub enable_haptics: bool,
    pub enable_notifications: bool,
    pub enable_auto_speak: bool,
    pub font_scale: f64,
}

impl Default for PreferenceState {
    fn default() -> Self {
        Self {
            theme: Theme::System,
            voice_uri: None,
            voice_volume: 1.0,
            voice_rate: 1.0,
            voice_pitch: 1.0,
            enable_haptics: true,
            enable_notifications: false,
            enable_auto_speak: false,
            font_scale: 1.0,
        }
    }
}

/// Partial preference update. `None` leaves the field as it is.
///
/// `voice_uri` is doubly optional: `Some(None)` clears the selected voice.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PreferencesPatch {
    #[serde(default)]
    pub theme: Option<Theme>,
    #[serde(default, rename = "voiceURI", deserialize_with = "present_or_null")]
    pub voice_uri: Option<Option<String>>,
    #[serde(default)]
    pub voice_volume: Option<f64>,
    #[serde(default)]
    pub voice_rate: Option<f64>,
    #[serde(default)]
    pub voice_pitch: Option<f64>,
    #[serde(default)]
    pub enable_haptics: Option<bool>,
    #[serde(default)]
    pub enable_notifications: Option<bool>,
    #[serde(default)]
    pub enable_auto_speak: Option<bool>,
    #[serde(default)]
    pub font_scale: Option<f64>,
}

/// Distinguishes an explicit `null` from an absent key
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

impl PreferencesPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Shallow merge onto `base`
    pub fn apply(&self, base: &PreferenceState) -> PreferenceState {
        PreferenceState {
            theme: self.theme.unwrap_or(base.theme),
            voice_uri: self
                .voice_uri
                .clone()
                .unwrap_or_else(|| base.voice_uri.clone()),
            voice_volume: self.voice_volume.unwrap_or(base.voice_volume),
            voice_rate: self.voice_rate.unwrap_or(base.voice_rate),
            voice_pitch: self.voice_pitch.unwrap_or(base.voice_pitch),
            enable_haptics: self.enable_haptics.unwrap_or(base.enable_haptics),
            enable_notifications: self
                .enable_notifications
                .unwrap_or(base.enable_notifications),
            enable_auto_speak: self.enable_auto_speak.unwrap_or(base.enable_auto_speak),
            font_scale: self.font_scale.unwrap_or(base.font_scale),
        }
    }
}

// ============================================================================
// App State
// ============================================================================

/// The whole application state. Conversations are ordered newest-started first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    pub conversations: Vec<Conversation>,
    pub active_conversation_id: Option<String>,
    #[serde(default)]
    pub preferences: PreferenceState,
}

impl AppState {
    /// Startup state: one conversation holding the assistant greeting
    pub fn seeded(ids: &mut IdGenerator, now: DateTime<Utc>) -> Self {
        let greeting = Message::new(ids.next_id(), Role::Assistant, GREETING, now);
        let conversation =
            Conversation::new(ids.next_id(), SEED_CONVERSATION_TITLE, now, Some(greeting));
        Self {
            active_conversation_id: Some(conversation.id.clone()),
            conversations: vec![conversation],
            preferences: PreferenceState::default(),
        }
    }

    pub fn conversation(&self, conversation_id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    pub fn contains_conversation(&self, conversation_id: &str) -> bool {
        self.conversation(conversation_id).is_some()
    }

    /// The active conversation, if the active id resolves to one
    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active_conversation_id
            .as_deref()
            .and_then(|id| self.conversation(id))
    }
}
