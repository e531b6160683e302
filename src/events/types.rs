//! Scan event types
//!
//! Defines all event types that can be broadcast through the event bus.

use serde::{Deserialize, Serialize};

use crate::camera::FacingMode;
use crate::checkin::{ScanState, VisitOutcome};
use crate::error::{CameraError, ResolveError};

/// Scan event enumeration
///
/// All events are tagged with their event name for serialization.
/// The `serde(tag = "event", content = "data")` attribute creates a
/// JSON structure like:
/// ```json
/// {
///   "event": "scan.state_changed",
///   "data": { "state": { "state": "active" }, "facing": "environment" }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ScanEvent {
    // ============================================================================
    // Session Events
    // ============================================================================
    /// Scan session state changed
    #[serde(rename = "scan.state_changed")]
    StateChanged {
        state: ScanState,
        facing: FacingMode,
    },

    /// A camera track was acquired and is delivering frames
    #[serde(rename = "camera.started")]
    CameraStarted {
        /// Monotonic session id
        session_id: u64,
        facing: FacingMode,
        /// Whether the relaxed-constraint retry was needed
        relaxed: bool,
        torch_available: bool,
    },

    /// Acquiring or running the camera failed
    #[serde(rename = "camera.error")]
    CameraFailed {
        error: CameraError,
        /// Actionable text for the operator
        message: String,
    },

    /// Torch switched
    #[serde(rename = "camera.torch")]
    TorchChanged { on: bool },

    // ============================================================================
    // Scan Events
    // ============================================================================
    /// A customer reference was decoded; the check-in is being dispatched
    #[serde(rename = "scan.detected")]
    CodeDetected {
        /// Correlates the following `checkin.*` event
        scan_id: String,
        customer_ref: String,
    },

    /// A code was decoded but is not a customer reference
    #[serde(rename = "scan.unrecognized")]
    UnrecognizedCode {
        raw: String,
        /// Sampling resumes after this many milliseconds
        cooldown_ms: u64,
    },

    // ============================================================================
    // Check-in Events
    // ============================================================================
    /// The visit was recorded
    #[serde(rename = "checkin.completed")]
    CheckinCompleted {
        scan_id: String,
        outcome: VisitOutcome,
    },

    /// The visit recorder failed; scanning restarts after `retry_in_ms`
    #[serde(rename = "checkin.failed")]
    CheckinFailed {
        scan_id: String,
        error: ResolveError,
        retry_in_ms: u64,
    },
}

impl ScanEvent {
    /// Get the event name (for filtering/routing)
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::StateChanged { .. } => "scan.state_changed",
            Self::CameraStarted { .. } => "camera.started",
            Self::CameraFailed { .. } => "camera.error",
            Self::TorchChanged { .. } => "camera.torch",
            Self::CodeDetected { .. } => "scan.detected",
            Self::UnrecognizedCode { .. } => "scan.unrecognized",
            Self::CheckinCompleted { .. } => "checkin.completed",
            Self::CheckinFailed { .. } => "checkin.failed",
        }
    }

    /// Check if event matches a topic pattern
    ///
    /// Supports wildcards:
    /// - `*` matches all events
    /// - `scan.*` matches all scan events
    /// - `scan.detected` matches exact event
    pub fn matches_topic(&self, topic: &str) -> bool {
        if topic == "*" {
            return true;
        }

        let event_name = self.event_name();

        if let Some(prefix) = topic.strip_suffix(".*") {
            event_name
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('.'))
        } else {
            event_name == topic
        }
    }
}
