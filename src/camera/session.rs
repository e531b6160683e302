//! Camera session
//!
//! Owns the exclusive hardware track. Every way out of a session, whether
//! success, cancel, error or facing switch, goes through [`CameraSession::stop`],
//! and dropping the session stops it too.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::backend::{CameraBackend, StreamRequest, VideoTrack};
use super::capabilities::{probe, CameraCapabilities};
use super::format::{FacingMode, Resolution};
use crate::config::CameraConfig;
use crate::error::CameraError;

/// Identifies one acquisition of the camera
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Monotonic per-session id
    pub id: u64,
    /// Facing mode the track was opened with
    pub facing: FacingMode,
    /// Whether the relaxed retry was needed
    pub relaxed: bool,
}

/// Exclusive owner of at most one open video track
pub struct CameraSession {
    backend: Arc<dyn CameraBackend>,
    ideal_resolution: Resolution,
    ready_timeout: Duration,
    track: Option<Box<dyn VideoTrack>>,
    handle: Option<SessionHandle>,
    capabilities: CameraCapabilities,
    facing: FacingMode,
    torch_on: bool,
    next_id: u64,
}

impl CameraSession {
    pub fn new(backend: Arc<dyn CameraBackend>, config: &CameraConfig) -> Self {
        Self {
            backend,
            ideal_resolution: config.ideal_resolution(),
            ready_timeout: config.ready_timeout(),
            track: None,
            handle: None,
            capabilities: CameraCapabilities::default(),
            facing: config.default_facing,
            torch_on: false,
            next_id: 1,
        }
    }

    /// Acquire the camera for `facing`
    ///
    /// Any previously open track is released first. The ideal-resolution
    /// request is tried once; an `Overconstrained` rejection triggers exactly
    /// one retry with minimal constraints.
    pub async fn start(&mut self, facing: FacingMode) -> Result<SessionHandle, CameraError> {
        self.stop();
        self.facing = facing;

        let backend = self.backend.clone();
        let (mut track, relaxed) = acquire(backend.as_ref(), facing, self.ideal_resolution).await?;

        match tokio::time::timeout(self.ready_timeout, track.wait_ready()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                track.stop();
                return Err(e);
            }
            Err(_) => {
                track.stop();
                return Err(CameraError::Unknown(format!(
                    "video source not ready after {}ms",
                    self.ready_timeout.as_millis()
                )));
            }
        }

        self.capabilities = probe(track.as_ref(), self.backend.as_ref());

        let handle = SessionHandle {
            id: self.next_id,
            facing,
            relaxed,
        };
        self.next_id += 1;

        info!(
            "Camera session {} started: {} ({}, torch={})",
            handle.id,
            track.label(),
            facing,
            self.capabilities.torch
        );

        self.track = Some(track);
        self.handle = Some(handle.clone());
        Ok(handle)
    }

    /// Release the track if one is open
    ///
    /// Idempotent: returns `false` when there was nothing to release.
    pub fn stop(&mut self) -> bool {
        self.torch_on = false;
        let Some(mut track) = self.track.take() else {
            self.handle = None;
            return false;
        };
        track.stop();
        if let Some(handle) = self.handle.take() {
            info!("Camera session {} stopped", handle.id);
        }
        true
    }

    /// Release the session identified by `handle`
    ///
    /// A stale handle, or one that was never started, is ignored.
    pub fn release(&mut self, handle: &SessionHandle) -> bool {
        if self.handle.as_ref().map(|h| h.id) != Some(handle.id) {
            debug!("Ignoring release of stale session {}", handle.id);
            return false;
        }
        self.stop()
    }

    /// Toggle the torch
    ///
    /// Succeeds without touching hardware when no torch was probed.
    pub fn set_torch(&mut self, on: bool) -> Result<(), CameraError> {
        if !self.capabilities.torch {
            debug!("Torch not supported, ignoring request");
            return Ok(());
        }
        let Some(track) = self.track.as_mut() else {
            return Ok(());
        };
        track.set_torch(on)?;
        self.torch_on = on;
        Ok(())
    }

    /// Stop, then start with the opposite facing mode
    pub async fn switch_facing(&mut self) -> Result<SessionHandle, CameraError> {
        let target = self.facing.opposite();
        self.stop();
        self.start(target).await
    }

    /// Active track, if any
    pub fn track(&self) -> Option<&dyn VideoTrack> {
        self.track.as_deref()
    }

    pub fn is_open(&self) -> bool {
        self.track.is_some()
    }

    pub fn handle(&self) -> Option<&SessionHandle> {
        self.handle.as_ref()
    }

    pub fn capabilities(&self) -> &CameraCapabilities {
        &self.capabilities
    }

    pub fn facing(&self) -> FacingMode {
        self.facing
    }

    pub fn torch_on(&self) -> bool {
        self.torch_on
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Open a track, retrying once with minimal constraints on `Overconstrained`
async fn acquire(
    backend: &dyn CameraBackend,
    facing: FacingMode,
    ideal: Resolution,
) -> Result<(Box<dyn VideoTrack>, bool), CameraError> {
    let constrained = StreamRequest::ideal(facing, ideal);
    match backend.open(&constrained).await {
        Ok(track) => Ok((track, false)),
        Err(CameraError::Overconstrained) => {
            warn!(
                "{} rejected {} for {}, retrying with relaxed constraints",
                backend.name(),
                ideal,
                facing
            );
            let track = backend.open(&StreamRequest::minimal(facing)).await?;
            Ok((track, true))
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::backend::fake::FakeCamera;

    fn session(camera: &FakeCamera) -> CameraSession {
        CameraSession::new(Arc::new(camera.clone()), &CameraConfig::default())
    }

    #[tokio::test]
    async fn test_start_uses_ideal_constraints() {
        let camera = FakeCamera::new();
        let mut session = session(&camera);

        let handle = session.start(FacingMode::Environment).await.unwrap();
        assert!(!handle.relaxed);
        assert_eq!(camera.open_tracks(), 1);
        assert_eq!(
            camera.requests(),
            vec![StreamRequest::ideal(FacingMode::Environment, Resolution::HD720)]
        );
    }

    #[tokio::test]
    async fn test_overconstrained_retries_once() {
        let camera = FakeCamera::new();
        camera.fail_next(CameraError::Overconstrained);
        let mut session = session(&camera);

        let handle = session.start(FacingMode::Environment).await.unwrap();
        assert!(handle.relaxed);
        let requests = camera.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].is_constrained());
        assert!(!requests[1].is_constrained());
        assert!(session.is_open());
    }

    #[tokio::test]
    async fn test_overconstrained_twice_surfaces() {
        let camera = FakeCamera::new();
        camera.fail_next(CameraError::Overconstrained);
        camera.fail_next(CameraError::Overconstrained);
        let mut session = session(&camera);

        let err = session.start(FacingMode::Environment).await.unwrap_err();
        assert_eq!(err, CameraError::Overconstrained);
        assert_eq!(camera.requests().len(), 2);
        assert_eq!(camera.open_tracks(), 0);
    }

    #[tokio::test]
    async fn test_other_errors_are_not_retried() {
        let camera = FakeCamera::new();
        camera.fail_next(CameraError::PermissionDenied);
        let mut session = session(&camera);

        let err = session.start(FacingMode::Environment).await.unwrap_err();
        assert_eq!(err, CameraError::PermissionDenied);
        assert_eq!(camera.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let camera = FakeCamera::new();
        let mut session = session(&camera);

        assert!(!session.stop());

        let handle = session.start(FacingMode::Environment).await.unwrap();
        assert!(session.stop());
        assert!(!session.stop());
        assert!(!session.release(&handle));
        assert_eq!(camera.open_tracks(), 0);
    }

    #[tokio::test]
    async fn test_stale_handle_does_not_release_new_session() {
        let camera = FakeCamera::new();
        let mut session = session(&camera);

        let first = session.start(FacingMode::Environment).await.unwrap();
        let second = session.start(FacingMode::Environment).await.unwrap();
        assert_ne!(first.id, second.id);
        assert!(!session.release(&first));
        assert_eq!(camera.open_tracks(), 1);
        assert!(session.release(&second));
        assert_eq!(camera.open_tracks(), 0);
    }

    #[tokio::test]
    async fn test_switch_facing_never_overlaps() {
        let camera = FakeCamera::new();
        let mut session = session(&camera);

        session.start(FacingMode::Environment).await.unwrap();
        let handle = session.switch_facing().await.unwrap();
        assert_eq!(handle.facing, FacingMode::User);
        let handle = session.switch_facing().await.unwrap();
        assert_eq!(handle.facing, FacingMode::Environment);

        assert_eq!(camera.open_tracks(), 1);
        assert_eq!(camera.max_open_tracks(), 1);
    }

    #[tokio::test]
    async fn test_torch_without_support_is_noop() {
        let camera = FakeCamera::new();
        let mut session = session(&camera);
        session.start(FacingMode::Environment).await.unwrap();

        session.set_torch(true).unwrap();
        assert!(!session.torch_on());
        assert!(!camera.state.lock().torch_on);
    }

    #[tokio::test]
    async fn test_torch_applies_when_supported() {
        let camera = FakeCamera::new();
        camera.state.lock().torch_supported = true;
        let mut session = session(&camera);
        session.start(FacingMode::Environment).await.unwrap();

        session.set_torch(true).unwrap();
        assert!(session.torch_on());
        assert!(camera.state.lock().torch_on);

        session.stop();
        assert!(!session.torch_on());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_timeout_releases_track() {
        let camera = FakeCamera::new();
        camera.state.lock().never_ready = true;
        let mut session = session(&camera);

        let err = session.start(FacingMode::Environment).await.unwrap_err();
        assert!(matches!(err, CameraError::Unknown(_)));
        assert_eq!(camera.open_tracks(), 0);
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_drop_releases_track() {
        let camera = FakeCamera::new();
        {
            let mut session = session(&camera);
            session.start(FacingMode::Environment).await.unwrap();
            assert_eq!(camera.open_tracks(), 1);
        }
        assert_eq!(camera.open_tracks(), 0);
    }
}
