//! Camera acquisition
//!
//! This module owns the exclusive video device: backend negotiation, the
//! session that guarantees release on every exit path, the capability probe
//! and the frame types handed to the sampler.

pub mod backend;
pub mod capabilities;
pub mod format;
pub mod frame;
pub mod session;
pub mod v4l2;

pub use backend::{CameraBackend, StreamRequest, TrackCapabilities, VideoTrack};
pub use capabilities::CameraCapabilities;
pub use format::{FacingMode, PixelFormat, Resolution};
pub use frame::{FrameBuffer, GrayImage, VideoFrame};
pub use session::{CameraSession, SessionHandle};
pub use v4l2::V4l2Camera;
