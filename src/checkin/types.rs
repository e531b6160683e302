//! Check-in state types shared by the controller, dispatcher and host UI

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::camera::FacingMode;
use crate::error::CameraError;

/// Lifecycle of the scan session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "error", rename_all = "snake_case")]
pub enum ScanState {
    /// No camera held
    #[default]
    Idle,
    /// Waiting for the device and for the first frames
    Acquiring,
    /// Sampling frames
    Active,
    /// A customer reference was decoded; sampling has stopped
    Detected,
    /// Releasing the camera
    Stopping,
    /// Acquisition or the running track failed
    Error(CameraError),
}

impl ScanState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Acquiring => "acquiring",
            Self::Active => "active",
            Self::Detected => "detected",
            Self::Stopping => "stopping",
            Self::Error(_) => "error",
        }
    }

    pub fn error(&self) -> Option<&CameraError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

impl std::fmt::Display for ScanState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error(e) => write!(f, "error({})", e),
            other => f.write_str(other.name()),
        }
    }
}

/// Check-in dispatcher state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchState {
    #[default]
    WaitingForDetection,
    Dispatching,
    RecoverableFailure,
    /// Terminal for this scan
    Done,
}

/// Result reported by the visit recorder
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitOutcome {
    pub customer_ref: String,
    /// Identifier of the recorded visit, if the recorder returns one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_id: Option<String>,
    /// Display name of the resolved customer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub customer_name: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl VisitOutcome {
    pub fn new(customer_ref: impl Into<String>) -> Self {
        Self {
            customer_ref: customer_ref.into(),
            visit_id: None,
            customer_name: None,
            recorded_at: Utc::now(),
        }
    }
}

/// Read-only projection for the host UI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanSnapshot {
    pub session_state: ScanState,
    /// Actionable text for the last failure, cleared on the next successful start
    pub last_error: Option<String>,
    pub torch_available: bool,
    pub torch_on: bool,
    pub facing: FacingMode,
    pub dispatch_state: DispatchState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_serialization() {
        let json = serde_json::to_value(ScanState::Active).unwrap();
        assert_eq!(json, serde_json::json!({"state": "active"}));

        let json = serde_json::to_value(ScanState::Error(CameraError::DeviceBusy)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"state": "error", "error": {"kind": "device_busy"}})
        );
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ScanState::Idle.to_string(), "idle");
        assert_eq!(
            ScanState::Error(CameraError::Unsupported).to_string(),
            "error(No camera API available)"
        );
    }

    #[test]
    fn test_visit_outcome_optional_fields() {
        let outcome: VisitOutcome = serde_json::from_value(serde_json::json!({
            "customer_ref": "abc",
            "recorded_at": "2024-05-01T10:00:00Z"
        }))
        .unwrap();
        assert_eq!(outcome.customer_ref, "abc");
        assert!(outcome.visit_id.is_none());
    }
}
