//! Application state machine
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod action;
mod effect;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use action::Action;
pub use effect::Effect;
pub use state::{
    AppState, Conversation, Message, PreferenceState, PreferencesPatch, Role, Theme,
};
pub use transition::{transition, TransitionResult};
