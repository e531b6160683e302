use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qr_checkin::camera::{CameraBackend, FacingMode, V4l2Camera};
use qr_checkin::checkin::{
    DispatchState, HttpVisitRecorder, LogVisitRecorder, NoopHaptics, ScanController, ScanHandle,
    ScanState, VisitRecorder,
};
use qr_checkin::config::{ConfigStore, ScannerConfig};
use qr_checkin::events::{EventBus, ScanEvent};
use qr_checkin::scan::RqrrDecoder;
use qr_checkin::AppError;

/// Log level for the application
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Verbose,
    Debug,
    Trace,
}

/// qr-checkin command line arguments
#[derive(Parser, Debug)]
#[command(name = "qr-checkin")]
#[command(version, about = "Camera-driven QR check-in kiosk", long_about = None)]
struct CliArgs {
    /// Configuration file (default: /etc/qr-checkin/config.json)
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Rear camera device node (overrides config)
    #[arg(long, value_name = "DEVICE")]
    rear_device: Option<String>,

    /// Front camera device node (overrides config)
    #[arg(long, value_name = "DEVICE")]
    front_device: Option<String>,

    /// Camera to start with: environment (rear) or user (front)
    #[arg(short = 'f', long, value_name = "FACING")]
    facing: Option<FacingMode>,

    /// Visit recorder base URL; without one check-ins are only logged
    #[arg(short = 'e', long, value_name = "URL")]
    endpoint: Option<String>,

    /// Exit after the first completed check-in
    #[arg(long)]
    once: bool,

    /// Switch the torch on when the camera starts
    #[arg(long)]
    torch: bool,

    /// Log level (error, warn, info, verbose, debug, trace)
    #[arg(short = 'l', long, value_name = "LEVEL", default_value = "info")]
    log_level: LogLevel,

    /// Increase verbosity (-v for verbose, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();

    init_logging(args.log_level, args.verbose, args.log_json);

    tracing::info!("Starting qr-checkin v{}", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().unwrap_or_else(get_config_path);
    let store = ConfigStore::load(&config_path).await?;
    let mut config = store.get().clone();
    apply_overrides(&mut config, &args);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let events = Arc::new(EventBus::new());
    let backend: Arc<dyn CameraBackend> = Arc::new(V4l2Camera::new(&config.camera));
    let recorder: Arc<dyn VisitRecorder> = if config.recorder.endpoint.is_some() {
        Arc::new(HttpVisitRecorder::new(&config.recorder)?)
    } else {
        tracing::warn!("No recorder endpoint configured, check-ins are only logged");
        Arc::new(LogVisitRecorder)
    };

    let controller = ScanController::new(
        backend,
        Box::new(RqrrDecoder::new()),
        recorder,
        Arc::new(NoopHaptics),
        &config,
        events.clone(),
    );
    let (handle, controller_task) = controller.spawn();
    let logger = tokio::spawn(log_events(events.subscribe()));

    let facing = args.facing.unwrap_or(config.camera.default_facing);
    let rearm_delay = config.checkin.failure_restart_delay();

    let outcome = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            Ok(())
        }
        result = kiosk(&handle, facing, args.once, args.torch, rearm_delay) => result,
    };

    if let Err(e) = handle.stop().await {
        tracing::warn!("Failed to stop scanner: {}", e);
    }
    drop(handle);
    if let Err(e) = controller_task.await {
        tracing::error!("Scan controller task failed: {}", e);
    }
    logger.abort();

    tracing::info!("Shutdown complete");
    outcome
}

/// Scan, check in, repeat
async fn kiosk(
    handle: &ScanHandle,
    facing: FacingMode,
    once: bool,
    torch: bool,
    rearm_delay: Duration,
) -> anyhow::Result<()> {
    let mut facing = Some(facing);
    loop {
        match handle.start(facing.take()).await {
            Ok(session) => {
                tracing::info!(
                    "Scanning with {} camera (session {})",
                    session.facing,
                    session.id
                );
                if torch {
                    if let Err(e) = handle.set_torch(true).await {
                        tracing::warn!("Torch unavailable: {}", e);
                    }
                }
            }
            Err(AppError::Camera(e)) if !e.is_terminal() => {
                tracing::warn!("{}", e.user_message());
                tokio::time::sleep(rearm_delay).await;
                continue;
            }
            Err(AppError::Camera(e)) => anyhow::bail!(e.user_message()),
            Err(e) => return Err(e.into()),
        }

        let snapshot = handle
            .wait_for(|s| {
                s.dispatch_state == DispatchState::Done
                    || matches!(s.session_state, ScanState::Error(_))
            })
            .await?;

        if let ScanState::Error(e) = &snapshot.session_state {
            if e.is_terminal() {
                anyhow::bail!(e.user_message());
            }
            tracing::warn!("{}", e.user_message());
        } else if once {
            return Ok(());
        }

        tokio::time::sleep(rearm_delay).await;
    }
}

/// Write scan events to the log
async fn log_events(mut rx: broadcast::Receiver<ScanEvent>) {
    loop {
        match rx.recv().await {
            Ok(ScanEvent::CheckinCompleted { outcome, .. }) => match &outcome.customer_name {
                Some(name) => tracing::info!("Checked in {} ({})", name, outcome.customer_ref),
                None => tracing::info!("Checked in {}", outcome.customer_ref),
            },
            Ok(ScanEvent::CheckinFailed {
                error, retry_in_ms, ..
            }) => {
                tracing::warn!("Check-in failed: {}, retrying in {}ms", error, retry_in_ms)
            }
            Ok(ScanEvent::UnrecognizedCode { .. }) => {
                tracing::info!("Not a recognized code")
            }
            Ok(event) => match serde_json::to_string(&event) {
                Ok(json) => tracing::debug!("event: {}", json),
                Err(_) => tracing::debug!("event: {}", event.event_name()),
            },
            Err(RecvError::Lagged(n)) => tracing::warn!("Event log lagged, {} events dropped", n),
            Err(RecvError::Closed) => break,
        }
    }
}

fn apply_overrides(config: &mut ScannerConfig, args: &CliArgs) {
    if let Some(device) = &args.rear_device {
        config.camera.rear_device = Some(device.clone());
    }
    if let Some(device) = &args.front_device {
        config.camera.front_device = Some(device.clone());
    }
    if let Some(facing) = args.facing {
        config.camera.default_facing = facing;
    }
    if let Some(endpoint) = &args.endpoint {
        config.recorder.endpoint = Some(endpoint.clone());
    }
}

/// Initialize logging with tracing
fn init_logging(level: LogLevel, verbose_count: u8, json: bool) {
    // Verbose count overrides log level
    let effective_level = match verbose_count {
        0 => level,
        1 => LogLevel::Verbose,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };

    let filter = match effective_level {
        LogLevel::Error => "qr_checkin=error,reqwest=error",
        LogLevel::Warn => "qr_checkin=warn,reqwest=warn",
        LogLevel::Info => "qr_checkin=info,reqwest=warn",
        LogLevel::Verbose => "qr_checkin=debug,reqwest=info",
        LogLevel::Debug => "qr_checkin=debug,reqwest=debug",
        LogLevel::Trace => "qr_checkin=trace,reqwest=debug",
    };

    // Environment variable takes highest priority
    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if let Err(err) = result {
        eprintln!("failed to initialize tracing: {}", err);
    }
}

/// Get the configuration file path
fn get_config_path() -> PathBuf {
    if let Ok(path) = std::env::var("QR_CHECKIN_CONFIG") {
        return PathBuf::from(path);
    }

    PathBuf::from("/etc/qr-checkin/config.json")
}
