//! Linux V4L2 camera and packet-capture lidar backend
//!
//! Cameras are encoded with FFmpeg straight from the V4L2 device node.
//! Lidar units stream UDP, so they are recorded as raw packet captures.

use super::traits::{CaptureBackend, CaptureError, CaptureTarget, Device};
use crate::process::{shell_quote, CommandSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Default network interface the lidar streams on
pub const DEFAULT_LIDAR_INTERFACE: &str = "enp7s0";

/// Camera encode settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraProfile {
    /// V4L2 input pixel format
    pub input_format: String,

    /// Frames per second requested from the device
    pub framerate: u32,

    /// Frame size, `WIDTHxHEIGHT`
    pub video_size: String,

    pub codec: String,
    pub preset: String,

    /// Video filter chain (cameras are mounted upside down)
    pub filter: String,

    /// Fixed focus distance applied before capture
    pub focus_absolute: u32,
}

impl Default for CameraProfile {
    fn default() -> Self {
        Self {
            input_format: "uyvy422".to_string(),
            framerate: 30,
            video_size: "1280x720".to_string(),
            codec: "libx264".to_string(),
            preset: "fast".to_string(),
            filter: "transpose=2,transpose=2".to_string(),
            focus_absolute: 5,
        }
    }
}

/// Production backend: `ffmpeg` for cameras, `tshark` for lidar
#[derive(Debug, Clone)]
pub struct V4l2Backend {
    profile: CameraProfile,
    lidar_interface: String,
}

impl V4l2Backend {
    pub fn new(profile: CameraProfile, lidar_interface: impl Into<String>) -> Self {
        Self {
            profile,
            lidar_interface: lidar_interface.into(),
        }
    }

    pub fn profile(&self) -> &CameraProfile {
        &self.profile
    }

    fn camera_command(&self, target: &CaptureTarget) -> Result<CommandSpec, CaptureError> {
        let device = target
            .device_path
            .as_deref()
            .ok_or(CaptureError::MissingDevicePath(target.device))?;
        let p = &self.profile;

        let ffmpeg = CommandSpec::new("ffmpeg").args([
            "-nostdin",
            "-y",                       // Overwrite output
            "-f",
            "video4linux2",
            "-input_format",
            &p.input_format,
            "-framerate",
            &p.framerate.to_string(),
            "-video_size",
            &p.video_size,
            "-i",
            &device.to_string_lossy(),
            "-c:v",
            &p.codec,
            "-preset",
            &p.preset,
            "-vf",
            &p.filter,
            &target.output_file.to_string_lossy(),
        ]);

        // exec so the graceful stop reaches ffmpeg and the mp4 gets finalized
        let script = match &target.sidecar {
            Some(sidecar) => format!(
                "echo $(date -Ins) > {} && exec {}",
                quote_path(sidecar),
                ffmpeg.command_line()
            ),
            None => format!("exec {}", ffmpeg.command_line()),
        };
        Ok(CommandSpec::shell(script))
    }

    fn lidar_command(&self, target: &CaptureTarget) -> CommandSpec {
        CommandSpec::new("tshark").args([
            "-i",
            self.lidar_interface.as_str(),
            "-w",
            &target.output_file.to_string_lossy(),
            "udp",
        ])
    }
}

impl Default for V4l2Backend {
    fn default() -> Self {
        Self::new(CameraProfile::default(), DEFAULT_LIDAR_INTERFACE)
    }
}

fn quote_path(path: &Path) -> String {
    shell_quote(&path.to_string_lossy()).into_owned()
}

/// Run one `v4l2-ctl` control change, logging instead of failing
async fn set_control(device: &Path, control: &str) {
    let result = Command::new("v4l2-ctl")
        .args(["-c", control, "-d"])
        .arg(device)
        .stdin(Stdio::null())
        .output()
        .await;

    match result {
        Ok(output) if output.status.success() => {
            tracing::debug!("Set {} on {:?}", control, device);
        }
        Ok(output) => tracing::warn!(
            "v4l2-ctl {} on {:?} failed: {}",
            control,
            device,
            String::from_utf8_lossy(&output.stderr).trim()
        ),
        Err(e) => tracing::warn!("Could not run v4l2-ctl for {:?}: {}", device, e),
    }
}

#[async_trait]
impl CaptureBackend for V4l2Backend {
    fn id(&self) -> &str {
        "v4l2"
    }

    async fn prepare(&self, target: &CaptureTarget) {
        // Autofocus hunts on a moving train; pin the focus distance
        if let (Device::Camera(_), Some(device)) = (target.device, target.device_path.as_deref()) {
            set_control(device, "focus_auto=0").await;
            set_control(device, &format!("focus_absolute={}", self.profile.focus_absolute)).await;
        }
    }

    fn command(&self, target: &CaptureTarget) -> Result<CommandSpec, CaptureError> {
        match target.device {
            Device::Camera(_) => self.camera_command(target),
            Device::Lidar(_) => Ok(self.lidar_command(target)),
        }
    }
}
