//! Recording state management
//!
//! Defines the recording state machine, the events it broadcasts and the
//! report a finished session leaves behind.

use crate::capture::Device;
use crate::config::WaysideIndex;
use crate::process::ExitSummary;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Current state of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RecordingState {
    /// Nothing started yet
    Idle,
    /// Suspended until the scheduled start time
    WaitingForStart,
    /// Capture processes are running
    Capturing,
    /// Stopping every capture process
    TearingDown,
    /// All processes reaped
    Done,
}

impl Default for RecordingState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Events emitted during a session
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    /// The state machine moved
    StateChanged(RecordingState),
    /// A capture process was launched
    DeviceStarted { device: Device, pid: Option<u32> },
    /// A capture process exited before teardown
    DeviceExited { device: Device, exit: ExitSummary },
    /// Error occurred
    Error(String),
}

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionOutcome {
    /// The recording window ran to its end
    Completed,
    /// An interrupt cut the session short
    Interrupted,
}

/// Final state of one capture process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceReport {
    pub device: Device,

    /// Command line the process ran
    pub command: String,

    pub pid: Option<u32>,

    pub exit: ExitSummary,

    /// Exited on its own before teardown
    pub exited_early: bool,
}

/// Summary of a finished session, also written as the run manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionReport {
    /// Unique session ID
    pub id: Uuid,

    /// Recipe name
    pub name: String,

    pub wayside: WaysideIndex,

    /// Capture backend identifier
    pub backend: String,

    /// Directory holding this wayside's artifacts (none if capture never began)
    pub wayside_dir: Option<PathBuf>,

    /// When capture began
    pub started_at: Option<DateTime<Local>>,

    /// When the last process was reaped
    pub ended_at: DateTime<Local>,

    pub outcome: SessionOutcome,

    pub devices: Vec<DeviceReport>,
}

impl SessionReport {
    /// Devices that stopped on their own before teardown
    pub fn early_exits(&self) -> impl Iterator<Item = &DeviceReport> {
        self.devices.iter().filter(|d| d.exited_early)
    }

    /// Write the report as pretty JSON
    pub fn save(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }

    pub fn load(path: &Path) -> Result<Self, std::io::Error> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LidarIndex;
    use tempfile::tempdir;

    #[test]
    fn test_report_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("recording.json");
        let report = SessionReport {
            id: Uuid::new_v4(),
            name: "lidar-to-lidar".to_string(),
            wayside: WaysideIndex::Wayside1,
            backend: "dry-run".to_string(),
            wayside_dir: Some(dir.path().to_path_buf()),
            started_at: Some(Local::now()),
            ended_at: Local::now(),
            outcome: SessionOutcome::Interrupted,
            devices: vec![DeviceReport {
                device: Device::Lidar(LidarIndex::Lidar1),
                command: "tshark -i enp7s0 -w lidar1.pcap udp".to_string(),
                pid: Some(4242),
                exit: ExitSummary::Signaled { signal: 15 },
                exited_early: false,
            }],
        };
        report.save(&path).unwrap();

        let json = fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"outcome\": \"interrupted\""));
        assert!(json.contains("\"kind\": \"lidar\""));

        let loaded = SessionReport::load(&path).unwrap();
        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.devices, report.devices);
        assert_eq!(loaded.early_exits().count(), 0);
    }
}
