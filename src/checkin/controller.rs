//! Scan pipeline controller
//!
//! The controller is the single owner of the scan session: the camera, the
//! frame sampler, the decode sequencer and the dispatcher all live here and
//! are only touched from one task. Hosts drive it through a [`ScanHandle`]
//! and observe it through the [`ScanSnapshot`] watch channel and the event
//! bus.
//!
//! ```text
//!  start ──► Acquiring ──► Active ──tick──► CustomerRef ──► Detected ──► Idle (Done)
//!                │           ▲  │                                   └──► Idle ──delay──► start
//!                ▼           │  └─tick──► Unrecognized ──cooldown──┘
//!              Error
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::dispatcher::{CheckinDispatcher, DispatchResult};
use super::haptics::Haptics;
use super::recorder::VisitRecorder;
use super::types::{ScanSnapshot, ScanState};
use crate::camera::{CameraBackend, CameraSession, FacingMode, SessionHandle};
use crate::config::{CheckinConfig, ScannerConfig, UnrecognizedPolicy};
use crate::error::{AppError, CameraError, Result};
use crate::events::{EventBus, ScanEvent};
use crate::scan::{
    classify, ClassifiedPayload, DecodeSequencer, Decoder, FrameSampler, SamplerStats, TickOutcome,
};

/// Host command queue depth
const COMMAND_QUEUE_CAPACITY: usize = 16;

/// Requests a host can make of the controller task
pub enum ScanCommand {
    Start {
        /// `None` keeps the current facing mode
        facing: Option<FacingMode>,
        reply: oneshot::Sender<std::result::Result<SessionHandle, CameraError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    SwitchFacing {
        reply: oneshot::Sender<std::result::Result<SessionHandle, CameraError>>,
    },
    SetTorch {
        on: bool,
        reply: oneshot::Sender<std::result::Result<(), CameraError>>,
    },
}

/// Deferred work scheduled by the check-in flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// Re-arm sampling on the still-open session
    ResumeSampling,
    /// Acquire the camera again from `Idle`
    Restart,
}

pub struct ScanController {
    camera: CameraSession,
    state: ScanState,
    sampler: FrameSampler,
    sequencer: DecodeSequencer,
    dispatcher: CheckinDispatcher,
    poll_interval: Duration,
    checkin: CheckinConfig,
    events: Arc<EventBus>,
    snapshot_tx: watch::Sender<ScanSnapshot>,
    last_error: Option<String>,
    /// Sampling timer; present only while frames should be sampled
    ticker: Option<Interval>,
    pending: Option<(Instant, PendingAction)>,
}

impl ScanController {
    pub fn new(
        backend: Arc<dyn CameraBackend>,
        decoder: Box<dyn Decoder>,
        recorder: Arc<dyn VisitRecorder>,
        haptics: Arc<dyn Haptics>,
        config: &ScannerConfig,
        events: Arc<EventBus>,
    ) -> Self {
        let camera = CameraSession::new(backend, &config.camera);
        let (snapshot_tx, _rx) = watch::channel(ScanSnapshot {
            facing: camera.facing(),
            ..Default::default()
        });

        Self {
            camera,
            state: ScanState::Idle,
            sampler: FrameSampler::new(),
            sequencer: DecodeSequencer::new(decoder, &config.scan),
            dispatcher: CheckinDispatcher::new(recorder, haptics, &config.checkin),
            poll_interval: config.scan.poll_interval(),
            checkin: config.checkin.clone(),
            events,
            snapshot_tx,
            last_error: None,
            ticker: None,
            pending: None,
        }
    }

    pub fn state(&self) -> &ScanState {
        &self.state
    }

    pub fn camera(&self) -> &CameraSession {
        &self.camera
    }

    pub fn dispatcher(&self) -> &CheckinDispatcher {
        &self.dispatcher
    }

    pub fn sampler_stats(&self) -> &SamplerStats {
        self.sampler.stats()
    }

    /// Whether the sampling timer is armed
    pub fn is_sampling(&self) -> bool {
        self.ticker.is_some()
    }

    pub fn pending(&self) -> Option<(Instant, PendingAction)> {
        self.pending
    }

    pub fn snapshot(&self) -> ScanSnapshot {
        let capabilities = self.camera.capabilities();
        ScanSnapshot {
            session_state: self.state.clone(),
            last_error: self.last_error.clone(),
            torch_available: self.camera.is_open() && capabilities.torch,
            torch_on: self.camera.torch_on(),
            facing: self.camera.facing(),
            dispatch_state: self.dispatcher.state(),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<ScanSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Acquire the camera and begin sampling
    ///
    /// Any previous session is fully released first.
    pub async fn start(&mut self, facing: FacingMode) -> std::result::Result<SessionHandle, CameraError> {
        self.halt_sampling();
        self.dispatcher.reset();
        self.sampler.reset();
        self.set_state(ScanState::Acquiring);

        match self.camera.start(facing).await {
            Ok(handle) => {
                self.last_error = None;
                self.events.publish(ScanEvent::CameraStarted {
                    session_id: handle.id,
                    facing: handle.facing,
                    relaxed: handle.relaxed,
                    torch_available: self.camera.capabilities().torch,
                });
                self.ticker = Some(self.new_ticker());
                self.set_state(ScanState::Active);
                Ok(handle)
            }
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Stop sampling and release the camera. Idempotent.
    pub fn stop(&mut self) {
        self.halt_sampling();
        if self.camera.is_open() {
            self.set_state(ScanState::Stopping);
            self.camera.stop();
        }
        self.set_state(ScanState::Idle);
    }

    /// Restart on the opposite camera; never holds two tracks
    pub async fn switch_facing(&mut self) -> std::result::Result<SessionHandle, CameraError> {
        let target = self.camera.facing().opposite();
        info!("Switching camera to {}", target);
        self.stop();
        self.start(target).await
    }

    pub fn set_torch(&mut self, on: bool) -> std::result::Result<(), CameraError> {
        let before = self.camera.torch_on();
        let result = self.camera.set_torch(on);
        if let Err(e) = &result {
            warn!("Failed to switch torch {}: {}", if on { "on" } else { "off" }, e);
        }
        let after = self.camera.torch_on();
        if after != before {
            self.events.publish(ScanEvent::TorchChanged { on: after });
        }
        self.publish_snapshot();
        result
    }

    /// Run one sampling tick
    ///
    /// A no-op unless the session is `Active` with sampling armed.
    pub async fn tick(&mut self) -> TickOutcome {
        if self.state != ScanState::Active || self.ticker.is_none() {
            return TickOutcome::Idle;
        }

        let live = match self.camera.track() {
            Some(track) => track.is_live(),
            None => return TickOutcome::Idle,
        };
        if !live {
            self.fail(CameraError::Unknown(
                "video source stopped delivering frames".to_string(),
            ));
            return TickOutcome::Idle;
        }

        let outcome = {
            let Some(track) = self.camera.track() else {
                return TickOutcome::Idle;
            };
            self.sampler.tick(track, &mut self.sequencer)
        };

        if let TickOutcome::Decoded(hit) = &outcome {
            let payload = classify(&hit.text);
            self.handle_payload(payload).await;
        }
        outcome
    }

    /// Execute the scheduled cooldown or restart, if any
    pub async fn fire_pending(&mut self) {
        let Some((_, action)) = self.pending.take() else {
            return;
        };
        match action {
            PendingAction::ResumeSampling => {
                if self.state == ScanState::Active && self.camera.is_open() {
                    debug!("Cooldown over, resuming sampling");
                    self.ticker = Some(self.new_ticker());
                }
            }
            PendingAction::Restart => {
                let facing = self.camera.facing();
                info!("Restarting camera ({})", facing);
                if let Err(e) = self.start(facing).await {
                    debug!("Restart failed: {}", e);
                }
            }
        }
    }

    async fn handle_payload(&mut self, payload: ClassifiedPayload) {
        match payload {
            ClassifiedPayload::CustomerRef(customer_ref) => self.check_in(customer_ref).await,
            ClassifiedPayload::Unrecognized(raw) => self.reject(raw),
        }
    }

    async fn check_in(&mut self, customer_ref: String) {
        // No further ticks for this scan
        self.ticker = None;
        self.set_state(ScanState::Detected);

        let scan_id = Uuid::new_v4().to_string();
        self.events.publish(ScanEvent::CodeDetected {
            scan_id: scan_id.clone(),
            customer_ref: customer_ref.clone(),
        });

        match self.dispatcher.dispatch(&mut self.camera, &customer_ref).await {
            DispatchResult::Completed(outcome) => {
                self.events
                    .publish(ScanEvent::CheckinCompleted { scan_id, outcome });
                self.set_state(ScanState::Idle);
            }
            DispatchResult::Failed(e) => {
                let delay = self.checkin.failure_restart_delay();
                self.last_error = Some(e.to_string());
                self.events.publish(ScanEvent::CheckinFailed {
                    scan_id,
                    error: e,
                    retry_in_ms: delay.as_millis() as u64,
                });
                self.set_state(ScanState::Idle);
                self.pending = Some((Instant::now() + delay, PendingAction::Restart));
            }
            DispatchResult::Ignored => {
                warn!("Check-in already handled, releasing camera");
                self.stop();
            }
        }
    }

    fn reject(&mut self, raw: String) {
        let cooldown = self.checkin.unrecognized_cooldown();
        info!(
            "Not a recognized code ({} chars), pausing for {}ms",
            raw.chars().count(),
            cooldown.as_millis()
        );
        self.events.publish(ScanEvent::UnrecognizedCode {
            raw,
            cooldown_ms: cooldown.as_millis() as u64,
        });

        let resume_at = Instant::now() + cooldown;
        match self.checkin.unrecognized_policy {
            UnrecognizedPolicy::KeepAlive => {
                self.ticker = None;
                self.pending = Some((resume_at, PendingAction::ResumeSampling));
            }
            UnrecognizedPolicy::Reacquire => {
                self.stop();
                self.pending = Some((resume_at, PendingAction::Restart));
            }
        }
    }

    fn fail(&mut self, err: CameraError) {
        self.halt_sampling();
        self.camera.stop();
        if err.is_terminal() {
            error!("Camera failed: {}", err);
        } else {
            warn!("Camera failed: {}", err);
        }
        let message = err.user_message();
        self.last_error = Some(message.clone());
        self.events.publish(ScanEvent::CameraFailed {
            error: err.clone(),
            message,
        });
        self.set_state(ScanState::Error(err));
    }

    fn halt_sampling(&mut self) {
        self.ticker = None;
        self.pending = None;
    }

    fn new_ticker(&self) -> Interval {
        let mut ticker =
            tokio::time::interval_at(Instant::now() + self.poll_interval, self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    fn set_state(&mut self, state: ScanState) {
        if self.state != state {
            debug!("Scan state {} -> {}", self.state, state);
            self.state = state;
            self.events.publish(ScanEvent::StateChanged {
                state: self.state.clone(),
                facing: self.camera.facing(),
            });
        }
        self.publish_snapshot();
    }

    fn publish_snapshot(&self) {
        let snapshot = self.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }

    async fn handle_command(&mut self, command: ScanCommand) {
        match command {
            ScanCommand::Start { facing, reply } => {
                let facing = facing.unwrap_or_else(|| self.camera.facing());
                let _ = reply.send(self.start(facing).await);
            }
            ScanCommand::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }
            ScanCommand::SwitchFacing { reply } => {
                let _ = reply.send(self.switch_facing().await);
            }
            ScanCommand::SetTorch { on, reply } => {
                let _ = reply.send(self.set_torch(on));
            }
        }
    }

    /// Drive the controller until every [`ScanHandle`] is dropped
    ///
    /// Host commands, sampling ticks and the cooldown deadline are handled
    /// one at a time; each runs to completion before the next is polled.
    pub async fn run(mut self, mut commands: mpsc::Receiver<ScanCommand>) {
        info!("Scan controller running");
        loop {
            let deadline = self.pending.map(|(at, _)| at);
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                _ = next_tick(&mut self.ticker) => {
                    self.tick().await;
                }
                _ = wait_deadline(deadline) => {
                    self.fire_pending().await;
                }
            }
        }
        self.stop();
        info!("Scan controller stopped");
    }

    /// Spawn [`run`](Self::run) on the runtime
    pub fn spawn(self) -> (ScanHandle, JoinHandle<()>) {
        let (commands, rx) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        let handle = ScanHandle {
            commands,
            snapshot: self.snapshot_tx.subscribe(),
            events: self.events.clone(),
        };
        let task = tokio::spawn(self.run(rx));
        (handle, task)
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

async fn wait_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending::<()>().await,
    }
}

/// Cloneable host-side handle to a running controller
#[derive(Clone)]
pub struct ScanHandle {
    commands: mpsc::Sender<ScanCommand>,
    snapshot: watch::Receiver<ScanSnapshot>,
    events: Arc<EventBus>,
}

impl ScanHandle {
    async fn request<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> ScanCommand) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| AppError::Internal("scan controller is not running".to_string()))?;
        rx.await
            .map_err(|_| AppError::Internal("scan controller dropped the request".to_string()))
    }

    pub async fn start(&self, facing: Option<FacingMode>) -> Result<SessionHandle> {
        let result = self
            .request(|reply| ScanCommand::Start { facing, reply })
            .await?;
        Ok(result?)
    }

    pub async fn stop(&self) -> Result<()> {
        self.request(|reply| ScanCommand::Stop { reply }).await
    }

    pub async fn switch_facing(&self) -> Result<SessionHandle> {
        let result = self
            .request(|reply| ScanCommand::SwitchFacing { reply })
            .await?;
        Ok(result?)
    }

    pub async fn set_torch(&self, on: bool) -> Result<()> {
        let result = self
            .request(|reply| ScanCommand::SetTorch { on, reply })
            .await?;
        Ok(result?)
    }

    /// Latest published snapshot
    pub fn snapshot(&self) -> ScanSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<ScanSnapshot> {
        self.snapshot.clone()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ScanEvent> {
        self.events.subscribe()
    }

    /// Wait until a snapshot satisfies `predicate`
    pub async fn wait_for(&self, mut predicate: impl FnMut(&ScanSnapshot) -> bool) -> Result<ScanSnapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| predicate(s))
            .await
            .map_err(|_| AppError::Internal("scan controller is not running".to_string()))?
            .clone();
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::backend::fake::FakeCamera;
    use crate::camera::frame::GrayImage;
    use crate::checkin::haptics::fake::CountingHaptics;
    use crate::checkin::recorder::fake::RecordingRecorder;
    use crate::checkin::types::DispatchState;
    use crate::error::ResolveError;
    use crate::scan::DecodeError;

    const CUSTOMER: &str = "3fa85f64-5717-4562-b3fc-2c963f66afa6";

    /// Decoder keyed on the first pixel value shown by the fake camera
    fn pixel_decoder(image: &GrayImage<'_>) -> std::result::Result<Option<String>, DecodeError> {
        Ok(match image.pixel(0, 0) {
            1 => Some(CUSTOMER.to_string()),
            2 => Some("https://app.example/scan?customer=abc123".to_string()),
            3 => Some("random-text".to_string()),
            _ => None,
        })
    }

    struct Rig {
        camera: FakeCamera,
        recorder: RecordingRecorder,
        haptics: CountingHaptics,
        events: Arc<EventBus>,
    }

    fn rig_with(config: ScannerConfig) -> (ScanController, Rig) {
        let camera = FakeCamera::new();
        let recorder = RecordingRecorder::new();
        let haptics = CountingHaptics::default();
        let events = Arc::new(EventBus::new());
        let controller = ScanController::new(
            Arc::new(camera.clone()),
            Box::new(pixel_decoder),
            Arc::new(recorder.clone()),
            Arc::new(haptics.clone()),
            &config,
            events.clone(),
        );
        (
            controller,
            Rig {
                camera,
                recorder,
                haptics,
                events,
            },
        )
    }

    fn rig() -> (ScanController, Rig) {
        rig_with(ScannerConfig::default())
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let (mut controller, rig) = rig();
        controller.start(FacingMode::Environment).await.unwrap();
        assert_eq!(controller.state(), &ScanState::Active);
        assert!(controller.is_sampling());
        assert_eq!(rig.camera.open_tracks(), 1);

        controller.stop();
        controller.stop();
        assert_eq!(controller.state(), &ScanState::Idle);
        assert!(!controller.is_sampling());
        assert_eq!(rig.camera.open_tracks(), 0);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_idle() {
        let (mut controller, rig) = rig();
        controller.stop();
        assert_eq!(controller.state(), &ScanState::Idle);
        assert_eq!(rig.camera.open_tracks(), 0);
    }

    #[tokio::test]
    async fn test_start_failure_surfaces_error() {
        let (mut controller, rig) = rig();
        rig.camera.fail_next(CameraError::PermissionDenied);

        let err = controller.start(FacingMode::Environment).await.unwrap_err();
        assert_eq!(err, CameraError::PermissionDenied);
        assert_eq!(
            controller.state(),
            &ScanState::Error(CameraError::PermissionDenied)
        );
        let snapshot = controller.snapshot();
        assert!(snapshot.last_error.unwrap().contains("permission"));
        assert_eq!(rig.camera.open_tracks(), 0);
    }

    #[tokio::test]
    async fn test_resource_safety_across_operations() {
        let (mut controller, rig) = rig();
        controller.start(FacingMode::Environment).await.unwrap();
        controller.switch_facing().await.unwrap();
        assert_eq!(controller.camera().facing(), FacingMode::User);
        controller.start(FacingMode::Environment).await.unwrap();

        rig.camera.fail_next(CameraError::DeviceBusy);
        assert!(controller.switch_facing().await.is_err());
        assert_eq!(rig.camera.open_tracks(), 0);

        controller.start(FacingMode::User).await.unwrap();
        rig.camera.fail_next(CameraError::Unsupported);
        assert!(controller.start(FacingMode::Environment).await.is_err());
        assert_eq!(
            controller.state(),
            &ScanState::Error(CameraError::Unsupported)
        );

        assert_eq!(rig.camera.max_open_tracks(), 1);
        assert_eq!(rig.camera.open_tracks(), 0);
    }

    #[tokio::test]
    async fn test_tick_is_noop_before_active() {
        let (mut controller, rig) = rig();
        rig.camera.show(1);
        assert_eq!(controller.tick().await, TickOutcome::Idle);
        assert!(rig.recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn test_customer_code_dispatched_once() {
        let (mut controller, rig) = rig();
        let mut events = rig.events.subscribe();
        controller.start(FacingMode::Environment).await.unwrap();
        rig.camera.show(1);

        for _ in 0..5 {
            controller.tick().await;
        }

        assert_eq!(rig.recorder.calls(), vec![CUSTOMER]);
        assert_eq!(rig.haptics.pulses(), 1);
        assert_eq!(rig.camera.open_tracks(), 0);
        assert_eq!(controller.state(), &ScanState::Idle);
        assert_eq!(controller.dispatcher().state(), DispatchState::Done);
        assert!(!controller.is_sampling());

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.push(event.event_name());
        }
        assert!(names.contains(&"scan.detected"));
        assert!(names.contains(&"checkin.completed"));
    }

    #[tokio::test]
    async fn test_url_payload_dispatches_query_value() {
        let (mut controller, rig) = rig();
        controller.start(FacingMode::Environment).await.unwrap();
        rig.camera.show(2);
        controller.tick().await;
        assert_eq!(rig.recorder.calls(), vec!["abc123"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_keeps_session_and_resumes() {
        let (mut controller, rig) = rig();
        controller.start(FacingMode::Environment).await.unwrap();
        rig.camera.show(3);

        assert!(matches!(controller.tick().await, TickOutcome::Decoded(_)));
        assert_eq!(controller.state(), &ScanState::Active);
        assert_eq!(rig.camera.open_tracks(), 1);
        assert!(!controller.is_sampling());
        assert_eq!(controller.tick().await, TickOutcome::Idle);

        let (at, action) = controller.pending().unwrap();
        assert_eq!(action, PendingAction::ResumeSampling);
        assert_eq!(at - Instant::now(), Duration::from_secs(2));

        tokio::time::advance(Duration::from_secs(2)).await;
        controller.fire_pending().await;
        assert!(controller.is_sampling());
        assert!(rig.recorder.calls().is_empty());
        assert_eq!(rig.camera.max_open_tracks(), 1);
    }

    #[tokio::test]
    async fn test_unrecognized_reacquire_policy() {
        let mut config = ScannerConfig::default();
        config.checkin.unrecognized_policy = UnrecognizedPolicy::Reacquire;
        let (mut controller, rig) = rig_with(config);
        controller.start(FacingMode::Environment).await.unwrap();
        rig.camera.show(3);

        controller.tick().await;
        assert_eq!(controller.state(), &ScanState::Idle);
        assert_eq!(rig.camera.open_tracks(), 0);

        let (at, action) = controller.pending().unwrap();
        assert_eq!(action, PendingAction::Restart);
        assert_eq!(at - Instant::now(), Duration::from_secs(2));

        tokio::time::advance(Duration::from_secs(2)).await;
        controller.fire_pending().await;
        assert_eq!(controller.state(), &ScanState::Active);
        assert_eq!(rig.camera.open_tracks(), 1);
        assert_eq!(rig.camera.max_open_tracks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recorder_failure_restarts_after_delay() {
        let (mut controller, rig) = rig();
        rig.recorder
            .fail_next(ResolveError::Transport("connection refused".to_string()));
        controller.start(FacingMode::Environment).await.unwrap();
        rig.camera.show(1);

        controller.tick().await;
        assert_eq!(controller.state(), &ScanState::Idle);
        assert_eq!(
            controller.dispatcher().state(),
            DispatchState::RecoverableFailure
        );
        assert!(controller.snapshot().last_error.is_some());
        assert_eq!(rig.camera.open_tracks(), 0);

        let (at, action) = controller.pending().unwrap();
        assert_eq!(action, PendingAction::Restart);
        assert_eq!(at - Instant::now(), Duration::from_secs(2));

        tokio::time::advance(Duration::from_secs(2)).await;
        controller.fire_pending().await;
        assert_eq!(controller.state(), &ScanState::Active);
        assert_eq!(
            controller.dispatcher().state(),
            DispatchState::WaitingForDetection
        );

        controller.tick().await;
        assert_eq!(rig.recorder.calls().len(), 2);
        assert_eq!(controller.dispatcher().state(), DispatchState::Done);
    }

    #[tokio::test]
    async fn test_detection_after_done_releases_camera() {
        let (mut controller, rig) = rig();
        controller.start(FacingMode::Environment).await.unwrap();
        rig.camera.show(1);
        controller.tick().await;
        assert_eq!(controller.dispatcher().state(), DispatchState::Done);

        // Camera back up without re-arming the dispatcher
        controller
            .camera
            .start(FacingMode::Environment)
            .await
            .unwrap();
        controller.set_state(ScanState::Active);

        controller.check_in(CUSTOMER.to_string()).await;
        assert_eq!(rig.recorder.calls().len(), 1);
        assert_eq!(controller.state(), &ScanState::Idle);
        assert_eq!(rig.camera.open_tracks(), 0);
        assert!(controller.pending().is_none());
    }

    #[tokio::test]
    async fn test_stop_cancels_pending_restart() {
        let (mut controller, rig) = rig();
        rig.recorder.fail_next(ResolveError::Rejected("closed".to_string()));
        controller.start(FacingMode::Environment).await.unwrap();
        rig.camera.show(1);
        controller.tick().await;
        assert!(controller.pending().is_some());

        controller.stop();
        assert!(controller.pending().is_none());
        controller.fire_pending().await;
        assert_eq!(controller.state(), &ScanState::Idle);
        assert_eq!(rig.camera.open_tracks(), 0);
    }

    #[tokio::test]
    async fn test_dead_track_moves_to_error() {
        let (mut controller, rig) = rig();
        controller.start(FacingMode::Environment).await.unwrap();
        rig.camera.state.lock().dead = true;

        assert_eq!(controller.tick().await, TickOutcome::Idle);
        assert!(matches!(
            controller.state(),
            ScanState::Error(CameraError::Unknown(_))
        ));
        assert_eq!(rig.camera.open_tracks(), 0);
    }

    #[tokio::test]
    async fn test_torch_snapshot() {
        let (mut controller, rig) = rig();
        rig.camera.state.lock().torch_supported = true;
        controller.start(FacingMode::Environment).await.unwrap();
        assert!(controller.snapshot().torch_available);

        controller.set_torch(true).unwrap();
        assert!(controller.snapshot().torch_on);
        assert!(rig.camera.state.lock().torch_on);

        controller.stop();
        let snapshot = controller.snapshot();
        assert!(!snapshot.torch_available);
        assert!(!snapshot.torch_on);
    }

    #[tokio::test]
    async fn test_torch_without_support_is_noop() {
        let (mut controller, rig) = rig();
        controller.start(FacingMode::Environment).await.unwrap();
        controller.set_torch(true).unwrap();
        assert!(!controller.snapshot().torch_on);
        assert!(!rig.camera.state.lock().torch_on);
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_controller_end_to_end() {
        let (controller, rig) = rig();
        let (handle, task) = controller.spawn();

        handle.start(Some(FacingMode::Environment)).await.unwrap();
        assert_eq!(handle.snapshot().session_state, ScanState::Active);

        rig.camera.show(1);
        let done = handle
            .wait_for(|s| s.dispatch_state == DispatchState::Done)
            .await
            .unwrap();
        assert_eq!(done.session_state, ScanState::Idle);
        assert_eq!(rig.recorder.calls(), vec![CUSTOMER]);

        handle.stop().await.unwrap();
        drop(handle);
        task.await.unwrap();
        assert_eq!(rig.camera.open_tracks(), 0);
        assert_eq!(rig.camera.max_open_tracks(), 1);
    }

    #[tokio::test]
    async fn test_handle_reports_camera_errors() {
        let (controller, rig) = rig();
        rig.camera.fail_next(CameraError::DeviceNotFound);
        let (handle, _task) = controller.spawn();

        let err = handle.start(None).await.unwrap_err();
        assert!(matches!(err, AppError::Camera(CameraError::DeviceNotFound)));
        assert_eq!(
            handle.snapshot().session_state,
            ScanState::Error(CameraError::DeviceNotFound)
        );
    }
}
