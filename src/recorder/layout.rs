//! On-disk artifact layout
//!
//! ```text
//! {output_dir}/{name}/{YYYY-MM-DDTHH:MM}/wayside{N}/
//!     video/camera{N}.mp4
//!     video/camera{N}.txt
//!     pcd/lidar{N}.pcap
//!     recording.json
//! ```

use crate::capture::{CaptureTarget, Device, DeviceKind};
use crate::config::{CameraIndex, DeviceSelection, LidarIndex, WaysideIndex};
use chrono::NaiveDateTime;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Minute-resolution directory name shared by every host of a run
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Manifest written when a session ends
pub const MANIFEST_FILE: &str = "recording.json";

/// Paths of one wayside's artifacts for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    wayside_dir: PathBuf,
}

impl OutputLayout {
    pub fn new(
        output_dir: &Path,
        name: &str,
        started: NaiveDateTime,
        wayside: WaysideIndex,
    ) -> Self {
        Self {
            wayside_dir: output_dir
                .join(name)
                .join(started.format(TIMESTAMP_FORMAT).to_string())
                .join(wayside.key()),
        }
    }

    pub fn wayside_dir(&self) -> &Path {
        &self.wayside_dir
    }

    pub fn dir_for(&self, kind: DeviceKind) -> PathBuf {
        self.wayside_dir.join(kind.subdir())
    }

    pub fn camera_file(&self, camera: CameraIndex) -> PathBuf {
        self.dir_for(DeviceKind::Camera)
            .join(format!("camera{}.mp4", camera))
    }

    /// Start-timestamp sidecar next to the camera file
    pub fn camera_sidecar(&self, camera: CameraIndex) -> PathBuf {
        self.dir_for(DeviceKind::Camera)
            .join(format!("camera{}.txt", camera))
    }

    pub fn lidar_file(&self, lidar: LidarIndex) -> PathBuf {
        self.dir_for(DeviceKind::Lidar)
            .join(format!("lidar{}.pcap", lidar))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.wayside_dir.join(MANIFEST_FILE)
    }

    /// Capture target for `device`; cameras need their device node
    pub fn target(&self, device: Device, device_path: Option<PathBuf>) -> CaptureTarget {
        match device {
            Device::Camera(camera) => CaptureTarget {
                device,
                device_path,
                output_file: self.camera_file(camera),
                sidecar: Some(self.camera_sidecar(camera)),
            },
            Device::Lidar(lidar) => CaptureTarget {
                device,
                device_path: None,
                output_file: self.lidar_file(lidar),
                sidecar: None,
            },
        }
    }

    /// Create the subdirectories of the requested kinds only
    pub fn create_dirs(&self, selection: &DeviceSelection) -> io::Result<()> {
        if !selection.cameras.is_empty() {
            fs::create_dir_all(self.dir_for(DeviceKind::Camera))?;
        }
        if !selection.lidars.is_empty() {
            fs::create_dir_all(self.dir_for(DeviceKind::Lidar))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn started() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(7, 5, 42)
            .unwrap()
    }

    #[test]
    fn test_paths() {
        let layout = OutputLayout::new(
            Path::new("/data"),
            "lidar-to-lidar",
            started(),
            WaysideIndex::Wayside2,
        );
        assert_eq!(
            layout.wayside_dir(),
            Path::new("/data/lidar-to-lidar/2024-03-09T07:05/wayside2")
        );
        assert_eq!(
            layout.camera_file(CameraIndex::Camera3),
            Path::new("/data/lidar-to-lidar/2024-03-09T07:05/wayside2/video/camera3.mp4")
        );
        assert_eq!(
            layout.camera_sidecar(CameraIndex::Camera3),
            Path::new("/data/lidar-to-lidar/2024-03-09T07:05/wayside2/video/camera3.txt")
        );
        assert_eq!(
            layout.lidar_file(LidarIndex::Lidar1),
            Path::new("/data/lidar-to-lidar/2024-03-09T07:05/wayside2/pcd/lidar1.pcap")
        );
    }

    #[test]
    fn test_creates_only_requested_kinds() {
        let dir = tempdir().unwrap();
        let layout = OutputLayout::new(dir.path(), "run", started(), WaysideIndex::Wayside1);

        let lidar_only = DeviceSelection::new(Vec::<CameraIndex>::new(), [LidarIndex::Lidar1]);
        layout.create_dirs(&lidar_only).unwrap();
        assert!(layout.dir_for(DeviceKind::Lidar).is_dir());
        assert!(!layout.dir_for(DeviceKind::Camera).exists());
    }
}
