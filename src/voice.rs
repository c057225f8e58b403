//! Voice input capability
//!
//! The speech-to-text bridge lives outside this crate. All the core needs is
//! a way to start a capture that reports events, and a handle to stop it.

use tokio::sync::mpsc;

/// Events reported by an active capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoiceEvent {
    Started,
    /// A (possibly interim) transcript
    Result(String),
    Error,
    Ended,
}

/// Where a capture delivers its events
pub type VoiceEvents = mpsc::UnboundedSender<VoiceEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOptions {
    pub interim_results: bool,
    pub continuous: bool,
    /// BCP 47 locale, e.g. `en-US`
    pub language: String,
}

impl Default for CaptureOptions {
    fn default() -> Self {
        Self {
            interim_results: true,
            continuous: false,
            language: "en-US".to_string(),
        }
    }
}

/// An active voice capture
pub trait CaptureHandle {
    fn stop(&mut self);
}

/// Speech recognition provider
pub trait VoiceInput {
    /// Begin capturing. `None` when voice input is unsupported here.
    fn start(
        &self,
        events: VoiceEvents,
        options: &CaptureOptions,
    ) -> Option<Box<dyn CaptureHandle>>;
}

/// Provider for platforms without speech recognition
pub struct Unsupported;

impl VoiceInput for Unsupported {
    fn start(
        &self,
        _events: VoiceEvents,
        _options: &CaptureOptions,
    ) -> Option<Box<dyn CaptureHandle>> {
        tracing::debug!("Voice input is not supported on this platform");
        None
    }
}

/// Owns a capture handle and stops it when dropped
pub struct CaptureGuard {
    handle: Option<Box<dyn CaptureHandle>>,
}

impl CaptureGuard {
    pub fn new(handle: Box<dyn CaptureHandle>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// Stop the capture now. Later calls and the drop do nothing.
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.handle.take() {
            handle.stop();
        }
    }
}

impl Drop for CaptureGuard {
    fn drop(&mut self) {
        self.stop();
    }
}
