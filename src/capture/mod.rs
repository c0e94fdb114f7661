//! Device capture backends
//!
//! This module turns a requested device into the external process that
//! records it.

pub mod dry_run;
pub mod traits;
pub mod v4l2;

pub use dry_run::DryRunBackend;
pub use traits::{CaptureBackend, CaptureError, CaptureTarget, Device, DeviceKind};
pub use v4l2::{CameraProfile, V4l2Backend, DEFAULT_LIDAR_INTERFACE};
