//! Chat input controller
//!
//! Holds the draft text and the voice capture lifecycle behind the message
//! box, and hands finished messages to the engine.

use crate::engine::Engine;
use crate::haptics::Haptics;
use crate::state_machine::Message;
use crate::voice::{CaptureGuard, CaptureOptions, VoiceEvent, VoiceInput};
use tokio::sync::mpsc;

pub struct Composer<V, H> {
    draft: String,
    listening: bool,
    thinking: bool,
    capture: Option<CaptureGuard>,
    options: CaptureOptions,
    events_tx: mpsc::UnboundedSender<VoiceEvent>,
    events_rx: mpsc::UnboundedReceiver<VoiceEvent>,
    voice: V,
    haptics: H,
}

impl<V: VoiceInput, H: Haptics> Composer<V, H> {
    pub fn new(voice: V, haptics: H) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            draft: String::new(),
            listening: false,
            thinking: false,
            capture: None,
            options: CaptureOptions::default(),
            events_tx,
            events_rx,
            voice,
            haptics,
        }
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn is_listening(&self) -> bool {
        self.listening
    }

    /// Block sending while a reply is being produced.
    ///
    /// Replies come from outside this crate; whatever produces them sets this
    /// for the duration, through [`crate::repl::Session::set_thinking`] in the
    /// terminal front end.
    pub fn set_thinking(&mut self, thinking: bool) {
        self.thinking = thinking;
    }

    pub fn is_thinking(&self) -> bool {
        self.thinking
    }

    pub fn can_send(&self) -> bool {
        !self.thinking && !self.draft.trim().is_empty()
    }

    /// Start listening, or stop if already listening.
    ///
    /// `listening` only turns on once the capture reports that it started.
    pub fn toggle_voice(&mut self) {
        if self.listening {
            self.stop_voice();
            return;
        }

        // Replacing an earlier guard stops that capture
        self.capture = self
            .voice
            .start(self.events_tx.clone(), &self.options)
            .map(CaptureGuard::new);
        if self.capture.is_none() {
            tracing::debug!("Voice capture unavailable");
            self.listening = false;
        }
    }

    pub fn stop_voice(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        self.listening = false;
    }

    /// Apply every capture event received so far
    pub fn poll_voice(&mut self) {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                VoiceEvent::Started => self.listening = true,
                VoiceEvent::Result(transcript) => self.append_transcript(&transcript),
                VoiceEvent::Error => {
                    tracing::debug!("Voice capture reported an error");
                    self.stop_voice();
                }
                VoiceEvent::Ended => self.stop_voice(),
            }
        }
    }

    fn append_transcript(&mut self, transcript: &str) {
        if self.draft.is_empty() {
            self.draft = transcript.to_string();
        } else {
            self.draft.push(' ');
            self.draft.push_str(transcript);
        }
    }

    /// Send the trimmed draft as a user message and clear it.
    ///
    /// Nothing happens for a blank draft or while thinking.
    pub fn send(&mut self, engine: &mut Engine) -> Option<Message> {
        if !self.can_send() {
            return None;
        }
        if engine.state().preferences.enable_haptics {
            self.haptics.trigger();
        }
        let message = engine.send_message(self.draft.trim());
        self.draft.clear();
        Some(message)
    }
}
