//! `record`: run one wayside's recording session

use crate::capture::{CameraProfile, CaptureBackend, DryRunBackend, V4l2Backend, DEFAULT_LIDAR_INTERFACE};
use crate::config::{
    load_camera_mapping, require_absolute, CameraIndex, ConfigError, DeviceSelection, LidarIndex, Since,
    WaysideIndex,
};
use crate::recorder::{RecordError, RecordingSession, SessionConfig, SessionOutcome};
use crate::utils::{exit_code, AppResult};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Which capture backend drives the devices
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// ffmpeg on V4L2 cameras, tshark on the lidar interface
    V4l2,
    /// Placeholder loops, no devices touched
    DryRun,
}

#[derive(Args, Debug, Clone)]
pub struct RecordArgs {
    /// Artifacts go to OUTPUT_DIR/NAME/TIMESTAMP/wayside{INDEX}/{video,pcd}. Absolute path is mandatory.
    #[arg(short, long, env = "WAYSIDE_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Recording name
    #[arg(short, long, default_value = "lidar-to-lidar")]
    pub name: String,

    /// Wayside index of this host
    #[arg(short, long, default_value = "1")]
    pub index: WaysideIndex,

    /// Cameras to record
    #[arg(short, long, num_args = 1..)]
    pub camera: Vec<CameraIndex>,

    /// Lidars to record
    #[arg(short, long, num_args = 1..)]
    pub lidar: Vec<LidarIndex>,

    /// Recording duration in seconds
    #[arg(short, long, default_value_t = 30, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Camera id mapping file (json5), required when cameras are requested
    #[arg(short, long, env = "WAYSIDE_MAPPING")]
    pub mapping: Option<PathBuf>,

    /// Start recording at this time today (HH:MM:SS)
    #[arg(short, long)]
    pub since: Option<Since>,

    #[arg(long, value_enum, default_value_t = Backend::V4l2)]
    pub backend: Backend,

    /// Network interface the lidar streams on
    #[arg(long, default_value = DEFAULT_LIDAR_INTERFACE)]
    pub lidar_iface: String,

    /// Milliseconds between graceful stop and kill on teardown
    #[arg(long, default_value_t = 500)]
    pub grace_ms: u64,
}

impl RecordArgs {
    pub fn selection(&self) -> DeviceSelection {
        DeviceSelection::new(self.camera.iter().copied(), self.lidar.iter().copied())
    }

    fn backend(&self) -> Arc<dyn CaptureBackend> {
        match self.backend {
            Backend::V4l2 => Arc::new(V4l2Backend::new(
                CameraProfile::default(),
                self.lidar_iface.as_str(),
            )),
            Backend::DryRun => Arc::new(DryRunBackend),
        }
    }
}

pub async fn run(args: RecordArgs, cancel: &CancellationToken) -> AppResult<u8> {
    // same order the session validates in, so the mapping file is only read when needed
    let selection = args.selection();
    if selection.is_empty() {
        return Err(RecordError::EmptySelection.into());
    }
    require_absolute(&args.output_dir)?;
    let mapping = match (&args.mapping, selection.cameras.is_empty()) {
        (_, true) => None,
        (Some(path), false) => Some(load_camera_mapping(path)?),
        (None, false) => {
            return Err(ConfigError::Invalid(
                "--mapping is required when cameras are requested".to_string(),
            )
            .into())
        }
    };

    let config = SessionConfig {
        name: args.name.clone(),
        wayside: args.index,
        selection,
        duration: Duration::from_secs(args.timeout),
        since: args.since,
        output_dir: args.output_dir.clone(),
        mapping,
        grace: Duration::from_millis(args.grace_ms),
    };
    let session = RecordingSession::new(config, args.backend());
    tracing::info!(
        "Session {} for {}: {} devices, {}s",
        session.id(),
        args.index.key(),
        session.config().selection.len(),
        args.timeout
    );

    let report = session.run(cancel).await?;
    Ok(match report.outcome {
        SessionOutcome::Completed => exit_code::SUCCESS,
        SessionOutcome::Interrupted => {
            tracing::info!("Terminated.");
            exit_code::INTERRUPTED
        }
    })
}
