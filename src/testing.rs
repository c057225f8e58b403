//! Mock collaborators for tests

use crate::haptics::Haptics;
use crate::storage::{KeyValueStore, StoreError, StoreResult};
use crate::voice::{CaptureHandle, CaptureOptions, VoiceEvent, VoiceEvents, VoiceInput};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock Storage
// ============================================================================

/// Store whose every operation fails
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
        Err(StoreError::Unavailable("disk on fire".to_string()))
    }

    async fn set(&self, _key: &str, _value: &str) -> StoreResult<()> {
        Err(StoreError::Unavailable("disk on fire".to_string()))
    }
}

// ============================================================================
// Mock Voice Input
// ============================================================================

#[derive(Default)]
struct VoiceRecord {
    events: Option<VoiceEvents>,
    options: Option<CaptureOptions>,
}

/// Voice provider driven by the test through [`MockVoice::emit`]
#[derive(Clone, Default)]
pub struct MockVoice {
    record: Arc<Mutex<VoiceRecord>>,
    stops: Arc<AtomicUsize>,
}

impl MockVoice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an event through the most recently started capture
    pub fn emit(&self, event: VoiceEvent) {
        let record = self.record.lock().unwrap();
        if let Some(events) = &record.events {
            let _ = events.send(event);
        }
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<CaptureOptions> {
        self.record.lock().unwrap().options.clone()
    }
}

struct MockCapture {
    stops: Arc<AtomicUsize>,
}

impl CaptureHandle for MockCapture {
    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

impl VoiceInput for MockVoice {
    fn start(
        &self,
        events: VoiceEvents,
        options: &CaptureOptions,
    ) -> Option<Box<dyn CaptureHandle>> {
        let mut record = self.record.lock().unwrap();
        record.events = Some(events);
        record.options = Some(options.clone());
        Some(Box::new(MockCapture {
            stops: Arc::clone(&self.stops),
        }))
    }
}

// ============================================================================
// Mock Haptics
// ============================================================================

/// Counts haptic triggers
#[derive(Clone, Default)]
pub struct MockHaptics {
    triggers: Arc<AtomicUsize>,
}

impl MockHaptics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn count(&self) -> usize {
        self.triggers.load(Ordering::SeqCst)
    }
}

impl Haptics for MockHaptics {
    fn trigger(&self) {
        self.triggers.fetch_add(1, Ordering::SeqCst);
    }
}
