use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::camera::format::{FacingMode, Resolution};

/// Main scanner configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    /// Camera acquisition settings
    pub camera: CameraConfig,
    /// Sampling and decoding settings
    pub scan: ScanConfig,
    /// Dispatcher timing and policy
    pub checkin: CheckinConfig,
    /// Visit recorder settings
    pub recorder: RecorderConfig,
}

impl ScannerConfig {
    /// Reject values that would break the pipeline's timing contracts
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.scan.poll_interval_ms == 0 {
            return Err("scan.poll_interval_ms must be greater than 0".to_string());
        }
        if !(self.scan.crop_area_ratio > 0.0 && self.scan.crop_area_ratio <= 1.0) {
            return Err("scan.crop_area_ratio must be in (0, 1]".to_string());
        }
        if self.camera.ideal_width == 0 || self.camera.ideal_height == 0 {
            return Err("camera ideal resolution must be non-zero".to_string());
        }
        if self.camera.buffer_count == 0 {
            return Err("camera.buffer_count must be greater than 0".to_string());
        }
        if self.camera.rear_device.is_none() && self.camera.front_device.is_none() {
            return Err("at least one camera device must be configured".to_string());
        }
        Ok(())
    }
}

/// Camera acquisition configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CameraConfig {
    /// Device node for the environment-facing camera (e.g., /dev/video0)
    pub rear_device: Option<String>,
    /// Device node for the user-facing camera
    pub front_device: Option<String>,
    /// Facing mode used when scanning starts
    pub default_facing: FacingMode,
    /// Ideal resolution width for the constrained request
    pub ideal_width: u32,
    /// Ideal resolution height for the constrained request
    pub ideal_height: u32,
    /// Number of capture buffers
    pub buffer_count: u32,
    /// How long to wait for the first frame after acquisition
    pub ready_timeout_ms: u64,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            rear_device: Some("/dev/video0".to_string()),
            front_device: None,
            default_facing: FacingMode::Environment,
            ideal_width: 1280,
            ideal_height: 720,
            buffer_count: 2,
            ready_timeout_ms: 5000,
        }
    }
}

impl CameraConfig {
    pub fn ideal_resolution(&self) -> Resolution {
        Resolution::new(self.ideal_width, self.ideal_height)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ready_timeout_ms)
    }

    /// Device node configured for a facing mode
    pub fn device_for(&self, facing: FacingMode) -> Option<&str> {
        match facing {
            FacingMode::Environment => self.rear_device.as_deref(),
            FacingMode::User => self.front_device.as_deref(),
        }
    }
}

/// Sampling and decoding configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScanConfig {
    /// Fixed polling interval between sampled frames
    pub poll_interval_ms: u64,
    /// Minimum width and height for the centre-crop attempt
    pub min_crop_dimension: u32,
    /// Fraction of the frame area kept by the centre crop
    pub crop_area_ratio: f64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 200,
            min_crop_dimension: 200,
            crop_area_ratio: 0.5,
        }
    }
}

impl ScanConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// What to do with the camera after an unrecognized code
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UnrecognizedPolicy {
    /// Keep the session open and pause sampling for the cooldown
    #[default]
    KeepAlive,
    /// Release the camera and reacquire it after the cooldown
    Reacquire,
}

/// Check-in dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CheckinConfig {
    /// Pause after an unrecognized code before sampling resumes
    pub unrecognized_cooldown_ms: u64,
    /// Delay before restarting the camera after a failed dispatch
    pub failure_restart_delay_ms: u64,
    /// Camera handling on unrecognized codes
    pub unrecognized_policy: UnrecognizedPolicy,
    /// Haptic pulse length on a recognized code
    pub haptic_pulse_ms: u64,
}

impl Default for CheckinConfig {
    fn default() -> Self {
        Self {
            unrecognized_cooldown_ms: 2000,
            failure_restart_delay_ms: 2000,
            unrecognized_policy: UnrecognizedPolicy::KeepAlive,
            haptic_pulse_ms: 100,
        }
    }
}

impl CheckinConfig {
    pub fn unrecognized_cooldown(&self) -> Duration {
        Duration::from_millis(self.unrecognized_cooldown_ms)
    }

    pub fn failure_restart_delay(&self) -> Duration {
        Duration::from_millis(self.failure_restart_delay_ms)
    }

    pub fn haptic_pulse(&self) -> Duration {
        Duration::from_millis(self.haptic_pulse_ms)
    }
}

/// Visit recorder configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RecorderConfig {
    /// Base URL of the loyalty console API (None = log only)
    pub endpoint: Option<String>,
    /// Bearer token sent with each request
    pub api_token: Option<String>,
    /// Request timeout
    pub timeout_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_token: None,
            timeout_ms: 5000,
        }
    }
}
