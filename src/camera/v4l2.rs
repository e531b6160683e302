//! V4L2 camera backend
//!
//! Each track owns a capture thread holding a memory-mapped stream. The
//! thread keeps only the most recent frame; the sampler picks it up on its
//! own schedule. Facing modes map onto configured device nodes.

use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{debug, error, info, warn};
use v4l::buffer::Type;
use v4l::capability::Flags;
use v4l::control::{Control, Value};
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::Format;

use super::backend::{CameraBackend, StreamRequest, TrackCapabilities, VideoTrack};
use super::format::{FacingMode, PixelFormat, Resolution};
use super::frame::VideoFrame;
use crate::config::CameraConfig;
use crate::error::CameraError;
use crate::utils::LogThrottler;
use crate::warn_throttled;

/// V4L2_CID_FLASH_LED_MODE
const CID_FLASH_LED_MODE: u32 = 0x009c_0901;
const FLASH_LED_MODE_NONE: i64 = 0;
const FLASH_LED_MODE_TORCH: i64 = 2;
/// Minimum valid frame size (bytes)
const MIN_FRAME_SIZE: usize = 128;
/// Bounds how long a blocked dequeue can delay `stop`; kept at or below
/// one poll interval
const DEQUEUE_TIMEOUT: Duration = Duration::from_millis(200);

/// Camera backend over Linux V4L2 device nodes
pub struct V4l2Camera {
    config: CameraConfig,
}

impl V4l2Camera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }
}

#[async_trait]
impl CameraBackend for V4l2Camera {
    fn name(&self) -> &'static str {
        "v4l2"
    }

    fn facing_modes(&self) -> Vec<FacingMode> {
        [FacingMode::Environment, FacingMode::User]
            .into_iter()
            .filter(|facing| self.config.device_for(*facing).is_some())
            .collect()
    }

    async fn open(&self, request: &StreamRequest) -> Result<Box<dyn VideoTrack>, CameraError> {
        let path = self
            .config
            .device_for(request.facing)
            .ok_or(CameraError::DeviceNotFound)?
            .to_string();

        info!(
            "Opening {} for {} ({})",
            path,
            request.facing,
            match request.resolution {
                Some(res) => format!("ideal {}", res),
                None => "relaxed".to_string(),
            }
        );

        let shared = Arc::new(TrackShared {
            latest: parking_lot::Mutex::new(None),
            stop: AtomicBool::new(false),
            live: AtomicBool::new(true),
        });
        let (opened_tx, opened_rx) = oneshot::channel();
        let (ready_tx, ready_rx) = watch::channel(false);

        let thread = {
            let shared = shared.clone();
            let request = request.clone();
            let path = path.clone();
            let buffer_count = self.config.buffer_count;
            std::thread::Builder::new()
                .name("qr-capture".to_string())
                .spawn(move || {
                    capture_thread(path, request, buffer_count, shared, opened_tx, ready_tx)
                })
                .map_err(|e| CameraError::Unknown(format!("Failed to spawn capture thread: {}", e)))?
        };

        let opened = match opened_rx.await {
            Ok(Ok(opened)) => opened,
            Ok(Err(e)) => {
                join_off_runtime(thread).await;
                return Err(e);
            }
            Err(_) => {
                join_off_runtime(thread).await;
                return Err(CameraError::Unknown(
                    "capture thread exited during negotiation".to_string(),
                ));
            }
        };

        Ok(Box::new(V4l2Track {
            label: format!("{} ({})", opened.card, path),
            device: Some(opened.device),
            capabilities: opened.capabilities,
            shared,
            ready_rx,
            thread: Some(thread),
            torch_on: false,
        }))
    }
}

struct TrackShared {
    latest: parking_lot::Mutex<Option<VideoFrame>>,
    stop: AtomicBool,
    live: AtomicBool,
}

struct Opened {
    device: Arc<Device>,
    card: String,
    capabilities: TrackCapabilities,
}

struct Negotiated {
    resolution: Resolution,
    format: PixelFormat,
    stride: u32,
}

/// Open track on a V4L2 device
pub struct V4l2Track {
    label: String,
    device: Option<Arc<Device>>,
    capabilities: TrackCapabilities,
    shared: Arc<TrackShared>,
    ready_rx: watch::Receiver<bool>,
    thread: Option<JoinHandle<()>>,
    torch_on: bool,
}

#[async_trait]
impl VideoTrack for V4l2Track {
    fn label(&self) -> &str {
        &self.label
    }

    async fn wait_ready(&mut self) -> Result<(), CameraError> {
        self.ready_rx
            .wait_for(|ready| *ready)
            .await
            .map(|_| ())
            .map_err(|_| CameraError::Unknown("capture stopped before first frame".to_string()))
    }

    fn latest_frame(&self) -> Option<VideoFrame> {
        self.shared.latest.lock().clone()
    }

    fn is_live(&self) -> bool {
        self.thread.is_some() && self.shared.live.load(Ordering::SeqCst)
    }

    fn capabilities(&self) -> TrackCapabilities {
        self.capabilities.clone()
    }

    fn set_torch(&mut self, on: bool) -> Result<(), CameraError> {
        let Some(device) = self.device.as_ref() else {
            return Ok(());
        };
        let value = if on {
            FLASH_LED_MODE_TORCH
        } else {
            FLASH_LED_MODE_NONE
        };
        device
            .set_control(Control {
                id: CID_FLASH_LED_MODE,
                value: Value::Integer(value),
            })
            .map_err(|e| CameraError::from_io(&e))?;
        self.torch_on = on;
        Ok(())
    }

    /// Joins the capture thread in place. The thread checks its stop flag
    /// after every dequeue, so this blocks for at most `DEQUEUE_TIMEOUT`.
    fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };
        if self.torch_on {
            if let Err(e) = self.set_torch(false) {
                debug!("Failed to switch torch off: {}", e);
            }
        }
        self.shared.stop.store(true, Ordering::SeqCst);
        if thread.join().is_err() {
            error!("Capture thread for {} panicked", self.label);
        }
        self.device = None;
        *self.shared.latest.lock() = None;
        debug!("Released {}", self.label);
    }
}

impl Drop for V4l2Track {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Reap a capture thread that failed negotiation
async fn join_off_runtime(thread: JoinHandle<()>) {
    match tokio::task::spawn_blocking(move || thread.join()).await {
        Ok(Ok(())) => {}
        Ok(Err(_)) => error!("Capture thread panicked during negotiation"),
        Err(e) => warn!("Failed to join capture thread: {}", e),
    }
}

fn capture_thread(
    path: String,
    request: StreamRequest,
    buffer_count: u32,
    shared: Arc<TrackShared>,
    opened_tx: oneshot::Sender<Result<Opened, CameraError>>,
    ready_tx: watch::Sender<bool>,
) {
    let (device, card, negotiated) = match open_device(&path, &request) {
        Ok(v) => v,
        Err(e) => {
            warn!("Failed to open {}: {}", path, e);
            let _ = opened_tx.send(Err(e));
            return;
        }
    };
    let device = Arc::new(device);

    let mut stream = match MmapStream::with_buffers(&device, Type::VideoCapture, buffer_count) {
        Ok(stream) => stream,
        Err(e) => {
            let _ = opened_tx.send(Err(CameraError::from_io(&e)));
            return;
        }
    };
    stream.set_timeout(DEQUEUE_TIMEOUT);

    let capabilities = TrackCapabilities {
        torch: has_torch(&device),
        resolution: Some(negotiated.resolution),
    };
    info!(
        "Capture format on {}: {} {} stride={}",
        path, negotiated.resolution, negotiated.format, negotiated.stride
    );

    let opened = Opened {
        device: device.clone(),
        card,
        capabilities,
    };
    if opened_tx.send(Ok(opened)).is_err() {
        return;
    }

    let throttler = LogThrottler::with_secs(5);
    while !shared.stop.load(Ordering::SeqCst) {
        let (buf, meta) = match stream.next() {
            Ok(next) => next,
            Err(e) if e.kind() == io::ErrorKind::TimedOut => continue,
            Err(e) => {
                if is_device_lost(&e) {
                    error!("Video device lost: {} - {}", path, e);
                    break;
                }
                warn_throttled!(throttler, "capture_error", "Capture error on {}: {}", path, e);
                continue;
            }
        };

        let bytes_used = (meta.bytesused as usize).min(buf.len());
        if bytes_used < MIN_FRAME_SIZE {
            continue;
        }

        let frame = VideoFrame::new(
            Bytes::copy_from_slice(&buf[..bytes_used]),
            negotiated.resolution,
            negotiated.format,
            negotiated.stride,
            meta.sequence as u64,
        );
        *shared.latest.lock() = Some(frame);
        ready_tx.send_if_modified(|ready| !std::mem::replace(ready, true));
    }

    shared.live.store(false, Ordering::SeqCst);
    debug!("Capture loop on {} ended", path);
}

fn open_device(
    path: &str,
    request: &StreamRequest,
) -> Result<(Device, String, Negotiated), CameraError> {
    let device = Device::with_path(path).map_err(|e| CameraError::from_io(&e))?;

    let caps = device.query_caps().map_err(|e| CameraError::from_io(&e))?;
    if !caps.capabilities.contains(Flags::VIDEO_CAPTURE)
        || !caps.capabilities.contains(Flags::STREAMING)
    {
        return Err(CameraError::Unsupported);
    }

    let available: Vec<PixelFormat> = device
        .enum_formats()
        .map_err(|e| CameraError::from_io(&e))?
        .into_iter()
        .filter_map(|desc| PixelFormat::from_fourcc(desc.fourcc))
        .collect();

    let negotiated = match request.resolution {
        Some(ideal) => negotiate_ideal(&device, &available, ideal)?,
        None => negotiate_minimal(&device, &available)?,
    };

    Ok((device, caps.card, negotiated))
}

fn negotiate_ideal(
    device: &Device,
    available: &[PixelFormat],
    ideal: Resolution,
) -> Result<Negotiated, CameraError> {
    let format = PixelFormat::preferred_for_scanning()
        .iter()
        .copied()
        .find(|f| available.contains(f))
        .ok_or(CameraError::Overconstrained)?;

    let actual = device
        .set_format(&Format::new(ideal.width, ideal.height, format.to_fourcc()))
        .map_err(|e| CameraError::from_negotiation(&e))?;

    if actual.width != ideal.width || actual.height != ideal.height {
        warn!(
            "Requested {}, got {}x{}",
            ideal, actual.width, actual.height
        );
    }
    negotiated_from(actual)
}

fn negotiate_minimal(device: &Device, available: &[PixelFormat]) -> Result<Negotiated, CameraError> {
    let current = device.format().map_err(|e| CameraError::from_io(&e))?;
    if PixelFormat::from_fourcc(current.fourcc).is_some() {
        return negotiated_from(current);
    }

    let format = available.first().copied().ok_or_else(|| {
        CameraError::Unknown(format!("no readable pixel format (device uses {})", current.fourcc))
    })?;
    let actual = device
        .set_format(&Format::new(current.width, current.height, format.to_fourcc()))
        .map_err(|e| CameraError::from_io(&e))?;
    negotiated_from(actual)
}

fn negotiated_from(format: Format) -> Result<Negotiated, CameraError> {
    let pixel_format = PixelFormat::from_fourcc(format.fourcc)
        .ok_or_else(|| CameraError::Unknown(format!("driver chose unreadable format {}", format.fourcc)))?;
    let resolution = Resolution::new(format.width, format.height);
    let stride = if format.stride > 0 {
        format.stride
    } else {
        pixel_format.default_stride(format.width)
    };
    Ok(Negotiated {
        resolution,
        format: pixel_format,
        stride,
    })
}

fn has_torch(device: &Device) -> bool {
    match device.query_controls() {
        Ok(controls) => controls.iter().any(|c| c.id == CID_FLASH_LED_MODE),
        Err(e) => {
            debug!("Failed to query controls: {}", e);
            false
        }
    }
}

fn is_device_lost(err: &io::Error) -> bool {
    matches!(
        err.raw_os_error(),
        Some(libc::ENXIO)
            | Some(libc::ENODEV)
            | Some(libc::EIO)
            | Some(libc::EPIPE)
            | Some(libc::ESHUTDOWN)
    )
}
