//! Haptic feedback capability

/// Device vibration or similar tactile feedback
pub trait Haptics {
    fn trigger(&self);
}

/// For devices without haptic hardware
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn trigger(&self) {}
}
