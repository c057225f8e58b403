//! Versioned snapshot encoding
//!
//! Version history:
//! - v1: the bare `AppState` object, no envelope
//! - v2: `{ "version": 2, "savedAt": ..., "state": AppState }`

use crate::state_machine::AppState;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

pub const SNAPSHOT_VERSION: u64 = 2;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot is not valid: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported snapshot version {0}")]
    UnsupportedVersion(u64),
    #[error("Snapshot envelope has no state")]
    MissingState,
    #[error("Snapshot has no conversations")]
    NoConversations,
    #[error("Duplicate conversation id: {0}")]
    DuplicateConversation(String),
    #[error("Duplicate message id {message_id} in conversation {conversation_id}")]
    DuplicateMessage {
        conversation_id: String,
        message_id: String,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<'a> {
    version: u64,
    #[serde(with = "crate::ids::timestamp")]
    saved_at: DateTime<Utc>,
    state: &'a AppState,
}

/// Serialize `state` in the current envelope format
pub fn encode(state: &AppState, saved_at: DateTime<Utc>) -> Result<String, SnapshotError> {
    let envelope = Envelope {
        version: SNAPSHOT_VERSION,
        saved_at,
        state,
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Parse, migrate and validate a stored snapshot
pub fn decode(raw: &str) -> Result<AppState, SnapshotError> {
    let value: Value = serde_json::from_str(raw)?;
    let mut state: AppState = serde_json::from_value(migrate(value)?)?;
    validate(&state)?;
    repair_active(&mut state);
    Ok(state)
}

/// Point a dangling active id at the first conversation.
///
/// Set-active does not check its target, so a stored snapshot can legitimately
/// carry an id that names nothing.
fn repair_active(state: &mut AppState) {
    let Some(active) = &state.active_conversation_id else {
        return;
    };
    if state.contains_conversation(active) {
        return;
    }
    let first = state.conversations.first().map(|c| c.id.clone());
    tracing::warn!(
        active = %active,
        repaired = ?first,
        "Stored active conversation does not exist, activating the first one"
    );
    state.active_conversation_id = first;
}

/// Bring any known snapshot shape up to a bare current `AppState` value
fn migrate(value: Value) -> Result<Value, SnapshotError> {
    match value.get("version").map(Value::as_u64) {
        // v1 never carried a version field
        None => Ok(value),
        Some(Some(SNAPSHOT_VERSION)) => match value {
            Value::Object(mut map) => map.remove("state").ok_or(SnapshotError::MissingState),
            _ => Err(SnapshotError::MissingState),
        },
        Some(Some(other)) => Err(SnapshotError::UnsupportedVersion(other)),
        Some(None) => Err(SnapshotError::UnsupportedVersion(0)),
    }
}

/// Check the structural invariants the reducer relies on
pub fn validate(state: &AppState) -> Result<(), SnapshotError> {
    if state.conversations.is_empty() {
        return Err(SnapshotError::NoConversations);
    }

    let mut conversation_ids = HashSet::new();
    for conversation in &state.conversations {
        if !conversation_ids.insert(conversation.id.as_str()) {
            return Err(SnapshotError::DuplicateConversation(conversation.id.clone()));
        }
        let mut message_ids = HashSet::new();
        for message in &conversation.messages {
            if !message_ids.insert(message.id.as_str()) {
                return Err(SnapshotError::DuplicateMessage {
                    conversation_id: conversation.id.clone(),
                    message_id: message.id.clone(),
                });
            }
        }
    }

    Ok(())
}
