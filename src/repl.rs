//! Terminal front end
//!
//! Parses slash commands and renders the engine's state as plain text. Plain
//! lines go through the composer like typed chat input.

use crate::composer::Composer;
use crate::engine::Engine;
use crate::haptics::Haptics;
use crate::state_machine::state::NEW_SESSION_TITLE;
use crate::state_machine::{AppState, Message, PreferencesPatch, Role};
use crate::voice::VoiceInput;
use chrono::Local;
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

pub const HELP: &str = "\
Type a message and press enter to send it.

  /reply <text>      add an assistant reply to the active conversation
  /new [title]       start a conversation
  /list              list conversations
  /switch <n|id>     make a conversation active
  /rename <title>    rename the active conversation
  /delete [n|id]     delete a conversation (default: active)
  /clear             discard all conversations
  /export [path]     export the active conversation as JSON
  /prefs [json]      show preferences, or merge a JSON patch into them
  /voice             toggle voice input
  /help              show this help
  /quit              exit";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    Reply(String),
    New(Option<String>),
    List,
    Switch(String),
    Rename(String),
    Delete(Option<String>),
    Clear,
    Export(Option<PathBuf>),
    Prefs(Option<PreferencesPatch>),
    Voice,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command: /{0} (try /help)")]
    Unknown(String),
    #[error("/{0} needs an argument")]
    MissingArgument(&'static str),
    #[error("Invalid preferences: {0}")]
    InvalidPreferences(String),
}

/// Whether the loop should keep reading input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Parse one input line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Some(Command::Say(line.to_string())));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, Some(arg.trim()).filter(|a| !a.is_empty())),
        None => (rest, None),
    };
    let arg = arg.map(String::from);

    let command = match name {
        "reply" => Command::Reply(arg.ok_or(CommandError::MissingArgument("reply"))?),
        "new" => Command::New(arg),
        "list" | "ls" => Command::List,
        "switch" => Command::Switch(arg.ok_or(CommandError::MissingArgument("switch"))?),
        "rename" => Command::Rename(arg.ok_or(CommandError::MissingArgument("rename"))?),
        "delete" | "rm" => Command::Delete(arg),
        "clear" => Command::Clear,
        "export" => Command::Export(arg.map(PathBuf::from)),
        "prefs" => match arg {
            None => Command::Prefs(None),
            Some(json) => {
                let patch = serde_json::from_str(&json)
                    .map_err(|e| CommandError::InvalidPreferences(e.to_string()))?;
                Command::Prefs(Some(patch))
            }
        },
        "voice" => Command::Voice,
        "help" | "?" => Command::Help,
        "quit" | "exit" | "q" => Command::Quit,
        other => return Err(CommandError::Unknown(other.to_string())),
    };
    Ok(Some(command))
}

/// Find a conversation by 1-based list position or by id prefix
pub fn resolve_conversation(state: &AppState, reference: &str) -> Option<String> {
    if let Ok(n) = reference.parse::<usize>() {
        return n
            .checked_sub(1)
            .and_then(|i| state.conversations.get(i))
            .map(|c| c.id.clone());
    }
    let mut matches = state
        .conversations
        .iter()
        .filter(|c| c.id.starts_with(reference));
    match (matches.next(), matches.next()) {
        (Some(only), None) => Some(only.id.clone()),
        _ => None,
    }
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

pub fn render_message(message: &Message) -> String {
    let who = match message.role {
        Role::User => "you",
        Role::Assistant => "astra",
    };
    let at = message
        .timestamp
        .with_timezone(&Local)
        .format("%b %-d, %-I:%M %p");
    format!("[{at}] {who}: {}", message.content)
}

/// Print the active conversation
pub fn show_active(engine: &Engine, out: &mut impl Write) -> io::Result<()> {
    if let Some(conversation) = engine.active_conversation() {
        writeln!(out, "== {} ==", conversation.title)?;
        for message in &conversation.messages {
            writeln!(out, "{}", render_message(message))?;
        }
    }
    Ok(())
}

pub struct Session<V, H> {
    composer: Composer<V, H>,
}

impl<V: VoiceInput, H: Haptics> Session<V, H> {
    pub fn new(composer: Composer<V, H>) -> Self {
        Self { composer }
    }

    /// Hold typed messages back while a reply is being produced
    pub fn set_thinking(&mut self, thinking: bool) {
        self.composer.set_thinking(thinking);
    }

    #[allow(clippy::too_many_lines)]
    pub fn execute(
        &mut self,
        engine: &mut Engine,
        command: Command,
        out: &mut impl Write,
    ) -> io::Result<Flow> {
        match command {
            Command::Say(text) => {
                self.composer.set_draft(text);
                if let Some(message) = self.composer.send(engine) {
                    writeln!(out, "{}", render_message(&message))?;
                } else if self.composer.is_thinking() {
                    writeln!(out, "Astra is still thinking, message not sent")?;
                }
            }
            Command::Reply(text) => {
                let message = engine.send_message_as(text, Role::Assistant, None);
                writeln!(out, "{}", render_message(&message))?;
            }
            Command::New(title) => {
                let title = title.unwrap_or_else(|| NEW_SESSION_TITLE.to_string());
                let conversation = engine.start_conversation(title, None);
                writeln!(out, "Started \"{}\"", conversation.title)?;
            }
            Command::List => {
                let state = engine.state();
                for (i, conversation) in state.conversations.iter().enumerate() {
                    let marker = if state.active_conversation_id.as_deref()
                        == Some(conversation.id.as_str())
                    {
                        '*'
                    } else {
                        ' '
                    };
                    writeln!(
                        out,
                        "{marker} {}. {} ({} messages) {}",
                        i + 1,
                        conversation.title,
                        conversation.messages.len(),
                        short_id(&conversation.id)
                    )?;
                }
            }
            Command::Switch(reference) => {
                match resolve_conversation(&engine.state(), &reference) {
                    Some(id) => {
                        engine.set_active_conversation(id);
                        show_active(engine, out)?;
                    }
                    None => writeln!(out, "No conversation matches \"{reference}\"")?,
                }
            }
            Command::Rename(title) => match engine.active_conversation().map(|c| c.id.clone()) {
                Some(id) => {
                    engine.rename_conversation(id, title);
                    writeln!(out, "Renamed")?;
                }
                None => writeln!(out, "No active conversation")?,
            },
            Command::Delete(reference) => {
                let state = engine.state();
                let target = match &reference {
                    Some(reference) => resolve_conversation(&state, reference),
                    None => state.active_conversation_id.clone(),
                };
                match target {
                    Some(id) if state.conversations.len() == 1 => {
                        engine.delete_conversation(id);
                        writeln!(out, "The last conversation is kept, none is active now")?;
                    }
                    Some(id) => {
                        engine.delete_conversation(id);
                        writeln!(out, "Deleted")?;
                    }
                    None => writeln!(out, "No such conversation")?,
                }
            }
            Command::Clear => {
                engine.clear_history();
                writeln!(out, "History cleared")?;
            }
            Command::Export(path) => {
                let exported = engine
                    .active_conversation()
                    .and_then(|c| engine.export_conversation(&c.id));
                match (exported, path) {
                    (None, _) => writeln!(out, "Nothing to export")?,
                    (Some(json), None) => writeln!(out, "{json}")?,
                    (Some(json), Some(path)) => match std::fs::write(&path, json) {
                        Ok(()) => writeln!(out, "Exported to {}", path.display())?,
                        Err(e) => {
                            tracing::warn!(
                                path = %path.display(),
                                error = %e,
                                "Export write failed"
                            );
                            writeln!(out, "Could not write {}: {e}", path.display())?;
                        }
                    },
                }
            }
            Command::Prefs(patch) => {
                if let Some(patch) = patch {
                    engine.update_preferences(patch);
                }
                let prefs = engine.state().preferences.clone();
                let json = serde_json::to_string_pretty(&prefs).unwrap_or_default();
                writeln!(out, "{json}")?;
            }
            Command::Voice => {
                self.composer.toggle_voice();
                self.composer.poll_voice();
                if self.composer.is_listening() {
                    writeln!(out, "Listening...")?;
                } else {
                    writeln!(out, "Voice input off")?;
                }
            }
            Command::Help => writeln!(out, "{HELP}")?,
            Command::Quit => return Ok(Flow::Quit),
        }

        self.speak_pending(engine, out)?;
        Ok(Flow::Continue)
    }

    /// Read out unspoken assistant messages when auto-speak is on
    fn speak_pending(&mut self, engine: &mut Engine, out: &mut impl Write) -> io::Result<()> {
        let Some(conversation_id) = engine.active_conversation().map(|c| c.id.clone()) else {
            return Ok(());
        };
        for message in engine.pending_speech() {
            writeln!(out, "(speaking) {}", message.content)?;
            engine.mark_spoken(&conversation_id, &message.id);
        }
        Ok(())
    }

    /// Apply pending voice events and report transcribed text
    pub fn poll_voice(&mut self, out: &mut impl Write) -> io::Result<()> {
        let before = self.composer.draft().to_string();
        self.composer.poll_voice();
        if self.composer.draft() != before {
            writeln!(out, "(draft) {}", self.composer.draft())?;
        }
        Ok(())
    }
}
