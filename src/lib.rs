//! Astra Companion - application state engine for a calm-focused chat assistant
//!
//! Conversations, messages and preferences live in one immutable snapshot
//! advanced by a pure transition function. The [`engine::Engine`] owns the
//! snapshot, persists it through a background writer and publishes every
//! committed state to subscribers.

#![allow(
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

pub mod composer;
pub mod config;
pub mod engine;
pub mod haptics;
pub mod ids;
pub mod persistence;
pub mod provider;
pub mod repl;
pub mod state_machine;
pub mod storage;
pub mod voice;

#[cfg(test)]
mod testing;
