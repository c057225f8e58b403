//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across arbitrary action sequences.

use super::state::*;
use super::transition::*;
use super::*;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Test Helpers
// ============================================================================

/// Abstract action. Targets are indices into the current conversation list so
/// that generated sequences keep hitting existing entities.
#[derive(Debug, Clone)]
enum Step {
    Start { with_seed: bool },
    SetActiveExisting(usize),
    AddMessage { target: usize, role: Role, content: String },
    AddMessageUnknown,
    UpdatePreferences(PreferencesPatch),
    Clear,
    Delete(usize),
    DeleteUnknown,
    MarkSpoken { target: usize, message: usize },
    Rename { target: usize, title: String },
}

/// Turns steps into concrete actions with unique ids and increasing timestamps
struct Materializer {
    counter: u32,
    base: DateTime<Utc>,
}

impl Materializer {
    fn new() -> Self {
        Self {
            counter: 0,
            base: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
        }
    }

    fn next(&mut self, prefix: &str) -> (String, DateTime<Utc>) {
        self.counter += 1;
        (
            format!("{prefix}-{}", self.counter),
            self.base + Duration::seconds(i64::from(self.counter)),
        )
    }

    fn conversation(&mut self, with_seed: bool) -> Conversation {
        let (id, ts) = self.next("conv");
        let seed = with_seed.then(|| {
            let (msg_id, _) = self.next("msg");
            Message::new(msg_id, Role::Assistant, "welcome", ts)
        });
        Conversation::new(id, "Session", ts, seed)
    }

    fn action(&mut self, state: &AppState, step: Step) -> Action {
        let pick = |i: usize| &state.conversations[i % state.conversations.len()];
        match step {
            Step::Start { with_seed } => Action::StartConversation {
                conversation: self.conversation(with_seed),
            },
            Step::SetActiveExisting(i) => Action::SetActive {
                conversation_id: pick(i).id.clone(),
            },
            Step::AddMessage {
                target,
                role,
                content,
            } => {
                let conversation_id = pick(target).id.clone();
                let (id, ts) = self.next("msg");
                Action::AddMessage {
                    conversation_id,
                    message: Message::new(id, role, content, ts),
                }
            }
            Step::AddMessageUnknown => {
                let (id, ts) = self.next("msg");
                Action::AddMessage {
                    conversation_id: "no-such-conversation".to_string(),
                    message: Message::new(id, Role::User, "lost", ts),
                }
            }
            Step::UpdatePreferences(patch) => Action::UpdatePreferences(patch),
            Step::Clear => Action::ClearHistory {
                fresh: self.conversation(false),
            },
            Step::Delete(i) => Action::DeleteConversation {
                conversation_id: pick(i).id.clone(),
            },
            Step::DeleteUnknown => Action::DeleteConversation {
                conversation_id: "no-such-conversation".to_string(),
            },
            Step::MarkSpoken { target, message } => {
                let conversation = pick(target);
                let message_id = if conversation.messages.is_empty() {
                    "no-such-message".to_string()
                } else {
                    conversation.messages[message % conversation.messages.len()]
                        .id
                        .clone()
                };
                Action::MarkSpoken {
                    conversation_id: conversation.id.clone(),
                    message_id,
                }
            }
            Step::Rename { target, title } => Action::RenameConversation {
                conversation_id: pick(target).id.clone(),
                title,
            },
        }
    }
}

fn initial_state(m: &mut Materializer) -> AppState {
    let conversation = m.conversation(true);
    AppState {
        active_conversation_id: Some(conversation.id.clone()),
        conversations: vec![conversation],
        preferences: PreferenceState::default(),
    }
}

fn active_is_valid(state: &AppState) -> bool {
    match &state.active_conversation_id {
        None => true,
        Some(id) => state.contains_conversation(id),
    }
}

fn ids_are_unique(state: &AppState) -> bool {
    let mut conv_ids = HashSet::new();
    let mut msg_ids = HashSet::new();
    state.conversations.iter().all(|c| {
        conv_ids.insert(c.id.as_str()) && c.messages.iter().all(|m| msg_ids.insert(m.id.as_str()))
    })
}

fn updated_at_tracks_last_message(state: &AppState) -> bool {
    state.conversations.iter().all(|c| match c.last_message() {
        Some(last) if c.messages.len() > 1 || last.timestamp != c.created_at => {
            c.updated_at == last.timestamp
        }
        _ => c.updated_at == c.created_at,
    })
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_role() -> impl Strategy<Value = Role> {
    prop_oneof![Just(Role::User), Just(Role::Assistant)]
}

fn arb_theme() -> impl Strategy<Value = Theme> {
    prop_oneof![Just(Theme::System), Just(Theme::Light), Just(Theme::Dark)]
}

fn arb_patch() -> impl Strategy<Value = PreferencesPatch> {
    (
        proptest::option::of(arb_theme()),
        proptest::option::of(proptest::option::of("[a-z]{3,8}")),
        proptest::option::of(0.0f64..2.0),
        proptest::option::of(any::<bool>()),
        proptest::option::of(any::<bool>()),
        proptest::option::of(0.5f64..2.0),
    )
        .prop_map(
            |(theme, voice_uri, voice_rate, enable_haptics, enable_auto_speak, font_scale)| {
                PreferencesPatch {
                    theme,
                    voice_uri,
                    voice_rate,
                    enable_haptics,
                    enable_auto_speak,
                    font_scale,
                    ..PreferencesPatch::default()
                }
            },
        )
}

fn arb_step() -> impl Strategy<Value = Step> {
    prop_oneof![
        2 => any::<bool>().prop_map(|with_seed| Step::Start { with_seed }),
        2 => any::<usize>().prop_map(Step::SetActiveExisting),
        6 => (any::<usize>(), arb_role(), "[a-zA-Z ]{1,30}")
            .prop_map(|(target, role, content)| Step::AddMessage { target, role, content }),
        1 => Just(Step::AddMessageUnknown),
        2 => arb_patch().prop_map(Step::UpdatePreferences),
        1 => Just(Step::Clear),
        2 => any::<usize>().prop_map(Step::Delete),
        1 => Just(Step::DeleteUnknown),
        2 => (any::<usize>(), any::<usize>())
            .prop_map(|(target, message)| Step::MarkSpoken { target, message }),
        1 => (any::<usize>(), "[a-zA-Z ]{1,20}")
            .prop_map(|(target, title)| Step::Rename { target, title }),
    ]
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // Active id always resolves, the list is never empty, ids stay unique
    #[test]
    fn prop_structural_invariants_hold(steps in proptest::collection::vec(arb_step(), 0..40)) {
        let mut m = Materializer::new();
        let mut state = initial_state(&mut m);

        for step in steps {
            let action = m.action(&state, step);
            let kind = action.kind();
            if let Some(next) = transition(&state, action).new_state {
                state = next;
            }
            prop_assert!(active_is_valid(&state), "dangling active id after {}: {:?}", kind, state);
            prop_assert!(!state.conversations.is_empty(), "empty list after {}", kind);
            prop_assert!(ids_are_unique(&state), "duplicate id after {}", kind);
            prop_assert!(updated_at_tracks_last_message(&state), "stale updatedAt after {}", kind);
        }
    }

    // Messages of a surviving conversation are only ever appended to
    #[test]
    fn prop_messages_are_append_only(steps in proptest::collection::vec(arb_step(), 0..40)) {
        let mut m = Materializer::new();
        let mut state = initial_state(&mut m);

        for step in steps {
            let action = m.action(&state, step);
            let Some(next) = transition(&state, action).new_state else {
                continue;
            };
            for before in &state.conversations {
                let Some(after) = next.conversation(&before.id) else {
                    continue;
                };
                prop_assert!(after.messages.len() >= before.messages.len());
                for (old, new) in before.messages.iter().zip(&after.messages) {
                    prop_assert_eq!(&old.id, &new.id);
                    prop_assert_eq!(&old.content, &new.content);
                    prop_assert_eq!(old.role, new.role);
                    prop_assert_eq!(old.timestamp, new.timestamp);
                    // spoken only ever flips towards true
                    prop_assert!(!old.is_spoken() || new.is_spoken());
                }
            }
            state = next;
        }
    }

    // No-op transitions report no effects, committed ones always persist
    #[test]
    fn prop_effects_match_commit(steps in proptest::collection::vec(arb_step(), 1..30)) {
        let mut m = Materializer::new();
        let mut state = initial_state(&mut m);

        for step in steps {
            let action = m.action(&state, step);
            let result = transition(&state, action);
            match result.new_state {
                Some(next) => {
                    prop_assert!(result.effects.contains(&Effect::PersistState));
                    prop_assert!(result.effects.contains(&Effect::NotifySubscribers));
                    state = next;
                }
                None => prop_assert!(result.effects.is_empty()),
            }
        }
    }

    // An empty preference patch never changes anything
    #[test]
    fn prop_empty_patch_is_identity(patch in arb_patch()) {
        let mut m = Materializer::new();
        let state = initial_state(&mut m);
        let state = transition(&state, Action::UpdatePreferences(patch.clone()))
            .new_state
            .unwrap_or(state);

        let result = transition(&state, Action::UpdatePreferences(PreferencesPatch::default()));
        prop_assert!(result.new_state.is_none());

        // Applying the same patch twice is the same as applying it once
        let again = transition(&state, Action::UpdatePreferences(patch));
        prop_assert!(again.new_state.is_none());
    }

    // Unknown ids never change the state, apart from delete
    #[test]
    fn prop_unknown_ids_are_noops(
        steps in proptest::collection::vec(arb_step(), 0..20),
        title in "[a-z]{1,10}",
    ) {
        let mut m = Materializer::new();
        let mut state = initial_state(&mut m);
        for step in steps {
            let action = m.action(&state, step);
            if let Some(next) = transition(&state, action).new_state {
                state = next;
            }
        }

        let (msg_id, ts) = m.next("msg");
        let actions = vec![
            Action::AddMessage {
                conversation_id: "ghost".to_string(),
                message: Message::new(msg_id, Role::User, "x", ts),
            },
            Action::MarkSpoken {
                conversation_id: "ghost".to_string(),
                message_id: "ghost".to_string(),
            },
            Action::RenameConversation { conversation_id: "ghost".to_string(), title },
        ];
        for action in actions {
            prop_assert!(transition(&state, action).new_state.is_none());
        }
    }

    // Delete leaves the first conversation active, or nothing when the last one goes
    #[test]
    fn prop_delete_activates_first(
        steps in proptest::collection::vec(arb_step(), 0..20),
        target in any::<usize>(),
        unknown in any::<bool>(),
    ) {
        let mut m = Materializer::new();
        let mut state = initial_state(&mut m);
        for step in steps {
            let action = m.action(&state, step);
            if let Some(next) = transition(&state, action).new_state {
                state = next;
            }
        }

        let conversation_id = if unknown {
            "ghost".to_string()
        } else {
            state.conversations[target % state.conversations.len()].id.clone()
        };
        let deleting_last = state.conversations.len() == 1 && !unknown;
        let after = transition(
            &state,
            Action::DeleteConversation { conversation_id: conversation_id.clone() },
        )
        .new_state
        .unwrap_or_else(|| state.clone());

        if deleting_last {
            prop_assert_eq!(&after.conversations, &state.conversations);
            prop_assert_eq!(after.active_conversation_id, None);
        } else {
            prop_assert!(!after.contains_conversation(&conversation_id));
            let expected_len = state.conversations.len() - usize::from(!unknown);
            prop_assert_eq!(after.conversations.len(), expected_len);
            prop_assert_eq!(
                after.active_conversation_id.as_deref(),
                Some(after.conversations[0].id.as_str())
            );
        }
    }
}
