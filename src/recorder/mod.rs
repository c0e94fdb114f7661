//! Recording system module
//!
//! This module implements one wayside's recording run:
//! - OutputLayout for the on-disk artifact tree
//! - DeviceSupervisor to own and tear down the capture processes
//! - RecordingSession to drive the wait, capture and teardown states

pub mod layout;
pub mod session;
pub mod state;
pub mod supervisor;

pub use layout::{OutputLayout, MANIFEST_FILE, TIMESTAMP_FORMAT};
pub use session::{resolve_start, RecordingSession, SessionConfig};
pub use state::{DeviceReport, RecordingEvent, RecordingState, SessionOutcome, SessionReport};
pub use supervisor::DeviceSupervisor;

use crate::capture::{CaptureError, Device};
use crate::config::{ConfigError, Since};
use chrono::NaiveTime;
use thiserror::Error;

/// Recording-related errors
#[derive(Error, Debug)]
pub enum RecordError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("No camera or lidar requested")]
    EmptySelection,

    #[error("Start time {since} has already passed (now {now})")]
    Schedule { since: Since, now: NaiveTime },

    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error("Failed to start {device}: {source}")]
    Spawn {
        device: Device,
        #[source]
        source: std::io::Error,
    },

    #[error("Session cannot run from state {0:?}")]
    InvalidState(RecordingState),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for recording operations
pub type RecordResult<T> = Result<T, RecordError>;
