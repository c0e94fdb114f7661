//! Configuration model
//!
//! Typed session, recipe and camera-mapping documents, validated on load.

pub mod loader;
pub mod schema;

pub use loader::{load_camera_mapping, load_recipe, load_session, require_absolute, ConfigError};
pub use schema::{
    CameraDevices, CameraIndex, CameraMapping, DeviceList, DeviceSelection, Host, IndexError,
    LidarIndex, Recipe, Session, Since, WaysideIndex,
};
