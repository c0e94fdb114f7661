//! Capture trait definitions
//!
//! Device-agnostic description of what to capture and where, plus the
//! backend trait that turns it into a command line.

use crate::config::{CameraIndex, LidarIndex};
use crate::process::CommandSpec;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Capture-related errors
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("No device path for {0}")]
    MissingDevicePath(Device),
}

/// Kind of sensor a device belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Camera,
    Lidar,
}

impl DeviceKind {
    /// Artifact subdirectory for this kind
    pub fn subdir(self) -> &'static str {
        match self {
            DeviceKind::Camera => "video",
            DeviceKind::Lidar => "pcd",
        }
    }
}

/// One logical sensor on a wayside
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "index")]
pub enum Device {
    Camera(CameraIndex),
    Lidar(LidarIndex),
}

impl Device {
    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Camera(_) => DeviceKind::Camera,
            Device::Lidar(_) => DeviceKind::Lidar,
        }
    }

    /// Stable name, e.g. `camera2` or `lidar1`
    pub fn name(&self) -> String {
        match self {
            Device::Camera(index) => format!("camera{}", index),
            Device::Lidar(index) => format!("lidar{}", index),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// Everything a backend needs to capture one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaptureTarget {
    /// Logical device
    pub device: Device,

    /// Physical device node (cameras only)
    pub device_path: Option<PathBuf>,

    /// Primary artifact
    pub output_file: PathBuf,

    /// Start-timestamp sidecar (cameras only)
    pub sidecar: Option<PathBuf>,
}

/// Builds the capture process for a device
///
/// Backends only describe processes; spawning and teardown belong to the
/// supervisor.
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Backend identifier used in logs and manifests
    fn id(&self) -> &str;

    /// Best-effort device setup before the capture starts
    ///
    /// Failures are logged and never abort the session.
    async fn prepare(&self, _target: &CaptureTarget) {}

    /// Command that captures `target` until it is stopped
    fn command(&self, target: &CaptureTarget) -> Result<CommandSpec, CaptureError>;
}
