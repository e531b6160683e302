//! Check-in flow
//!
//! The controller drives the camera and sampler, classifies decoded codes and
//! hands customer references to the dispatcher, which records the visit
//! exactly once per scan.

pub mod controller;
pub mod dispatcher;
pub mod haptics;
pub mod http;
pub mod recorder;
pub mod types;

pub use controller::{PendingAction, ScanCommand, ScanController, ScanHandle};
pub use dispatcher::{CheckinDispatcher, DispatchResult};
pub use haptics::{Haptics, NoopHaptics};
pub use http::HttpVisitRecorder;
pub use recorder::{LogVisitRecorder, VisitRecorder};
pub use types::{DispatchState, ScanSnapshot, ScanState, VisitOutcome};
