//! Camera backend abstraction
//!
//! A backend negotiates exclusive access to a video device and hands back a
//! [`VideoTrack`]. The pipeline only ever talks to these two traits, so the
//! V4L2 implementation can be swapped for an in-memory one in tests.

use async_trait::async_trait;
use serde::Serialize;

use super::format::{FacingMode, Resolution};
use super::frame::VideoFrame;
use crate::error::CameraError;

/// Constraints passed to [`CameraBackend::open`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamRequest {
    /// Which physical camera to use
    pub facing: FacingMode,
    /// Ideal resolution; `None` lets the device pick
    pub resolution: Option<Resolution>,
}

impl StreamRequest {
    /// Constrained request asking for an ideal resolution
    pub fn ideal(facing: FacingMode, resolution: Resolution) -> Self {
        Self {
            facing,
            resolution: Some(resolution),
        }
    }

    /// Minimal-constraint request, used after the device rejected the ideal one
    pub fn minimal(facing: FacingMode) -> Self {
        Self {
            facing,
            resolution: None,
        }
    }

    pub fn is_constrained(&self) -> bool {
        self.resolution.is_some()
    }
}

/// What an open track reports about the hardware behind it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackCapabilities {
    /// Device exposes a torch (flash LED) control
    pub torch: bool,
    /// Negotiated resolution, if known
    pub resolution: Option<Resolution>,
}

/// Source of exclusive video tracks
#[async_trait]
pub trait CameraBackend: Send + Sync {
    /// Backend identifier
    fn name(&self) -> &'static str;

    /// Facing modes this backend can serve
    fn facing_modes(&self) -> Vec<FacingMode>;

    /// Request an exclusive video track
    ///
    /// Must fail with [`CameraError::Overconstrained`] when the device rejects
    /// the requested constraints, so the session can retry with fewer.
    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn VideoTrack>, CameraError>;
}

/// An open, exclusively owned video track
#[async_trait]
pub trait VideoTrack: Send {
    /// Human readable device label
    fn label(&self) -> &str;

    /// Resolve once the source is delivering frames
    async fn wait_ready(&mut self) -> Result<(), CameraError>;

    /// Most recent frame, `None` while the source has nothing buffered
    fn latest_frame(&self) -> Option<VideoFrame>;

    /// Whether the underlying device is still delivering
    fn is_live(&self) -> bool;

    /// Hardware capabilities of this track
    fn capabilities(&self) -> TrackCapabilities;

    /// Apply the torch control
    fn set_torch(&mut self, on: bool) -> Result<(), CameraError>;

    /// Release the hardware. Must be idempotent.
    fn stop(&mut self);
}
