//! Check-in dispatcher
//!
//! Hands a customer reference to the visit recorder exactly once per scan.
//! The camera is released before the recorder is called, so the device is
//! never held while the back-end round trip runs.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::haptics::Haptics;
use super::recorder::VisitRecorder;
use super::types::{DispatchState, VisitOutcome};
use crate::camera::CameraSession;
use crate::config::CheckinConfig;
use crate::error::ResolveError;

/// What a call to [`CheckinDispatcher::dispatch`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchResult {
    Completed(VisitOutcome),
    Failed(ResolveError),
    /// A dispatch already happened for this scan
    Ignored,
}

pub struct CheckinDispatcher {
    state: DispatchState,
    recorder: Arc<dyn VisitRecorder>,
    haptics: Arc<dyn Haptics>,
    pulse: Duration,
    /// Recorder invocations over the dispatcher's lifetime
    dispatched: u64,
}

impl CheckinDispatcher {
    pub fn new(
        recorder: Arc<dyn VisitRecorder>,
        haptics: Arc<dyn Haptics>,
        config: &CheckinConfig,
    ) -> Self {
        Self {
            state: DispatchState::WaitingForDetection,
            recorder,
            haptics,
            pulse: config.haptic_pulse(),
            dispatched: 0,
        }
    }

    pub fn state(&self) -> DispatchState {
        self.state
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    /// Stop the camera, pulse, then record the visit
    ///
    /// Only valid from `WaitingForDetection`; any other state returns
    /// [`DispatchResult::Ignored`] without touching the recorder.
    pub async fn dispatch(&mut self, camera: &mut CameraSession, customer_ref: &str) -> DispatchResult {
        if self.state != DispatchState::WaitingForDetection {
            warn!(
                "Ignoring detection of {} while dispatcher is {:?}",
                customer_ref, self.state
            );
            return DispatchResult::Ignored;
        }
        self.state = DispatchState::Dispatching;

        camera.stop();
        if self.haptics.is_supported() {
            self.haptics.pulse(self.pulse);
        }

        self.dispatched += 1;
        info!(
            "Dispatching check-in for {} via {} recorder",
            customer_ref,
            self.recorder.name()
        );
        match self.recorder.resolve_and_record_visit(customer_ref).await {
            Ok(outcome) => {
                self.state = DispatchState::Done;
                info!("Check-in recorded for {}", customer_ref);
                DispatchResult::Completed(outcome)
            }
            Err(e) => {
                self.state = DispatchState::RecoverableFailure;
                warn!("Check-in for {} failed: {}", customer_ref, e);
                DispatchResult::Failed(e)
            }
        }
    }

    /// Arm the dispatcher for the next scan
    pub fn reset(&mut self) {
        self.state = DispatchState::WaitingForDetection;
    }
}
