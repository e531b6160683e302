//! Haptic feedback on successful classification
//!
//! Best effort: a device without a vibration motor simply does nothing.

use std::time::Duration;
use tracing::debug;

pub trait Haptics: Send + Sync {
    /// Fire a single pulse; never fails
    fn pulse(&self, duration: Duration);

    /// Whether `pulse` reaches any hardware
    fn is_supported(&self) -> bool {
        true
    }
}

/// No haptic hardware
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHaptics;

impl Haptics for NoopHaptics {
    fn pulse(&self, duration: Duration) {
        debug!("Haptic pulse ({} ms) skipped: no haptics", duration.as_millis());
    }

    fn is_supported(&self) -> bool {
        false
    }
}
