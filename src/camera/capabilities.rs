//! Capability probe
//!
//! Runs once after a track is acquired. The result only drives UI
//! affordances (torch button, facing switch); it never gates scanning.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::backend::{CameraBackend, VideoTrack};
use super::format::{FacingMode, Resolution};

/// What the active video device supports
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraCapabilities {
    /// Torch (flash LED) can be toggled
    pub torch: bool,
    /// Facing modes the backend can switch between
    pub facing_modes: Vec<FacingMode>,
    /// Negotiated resolution of the active track
    pub resolution: Option<Resolution>,
    /// Device label
    pub label: Option<String>,
}

impl CameraCapabilities {
    /// Whether a facing-mode switch has somewhere to go
    pub fn can_switch_facing(&self) -> bool {
        self.facing_modes.len() > 1
    }
}

/// Inspect the active track and the backend it came from
pub fn probe(track: &dyn VideoTrack, backend: &dyn CameraBackend) -> CameraCapabilities {
    let track_caps = track.capabilities();
    let caps = CameraCapabilities {
        torch: track_caps.torch,
        facing_modes: backend.facing_modes(),
        resolution: track_caps.resolution,
        label: Some(track.label().to_string()),
    };
    debug!(
        "Probed {} via {}: torch={}, facing={:?}",
        track.label(),
        backend.name(),
        caps.torch,
        caps.facing_modes
    );
    caps
}
