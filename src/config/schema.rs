//! Configuration schema definitions
//!
//! These types match the session, recipe and camera-mapping documents that
//! describe a fleet of waysides and one capture plan for it.

use super::loader::ConfigError;
use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

// =============================================================================
// Index Types
// =============================================================================

/// A value outside one of the closed index enumerations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind} index {value} is out of range (expected one of {allowed})")]
pub struct IndexError {
    pub kind: &'static str,
    pub value: String,
    pub allowed: &'static str,
}

macro_rules! index_enum {
    ($(#[$meta:meta])* $name:ident, $kind:literal, $allowed:literal, { $($variant:ident = $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "u8", into = "u8")]
        pub enum $name {
            $($variant = $value),+
        }

        impl $name {
            /// Every valid value, ascending
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// The 1-based number of this slot
            pub fn get(self) -> u8 {
                self as u8
            }
        }

        impl TryFrom<u8> for $name {
            type Error = IndexError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                match value {
                    $($value => Ok($name::$variant),)+
                    other => Err(IndexError {
                        kind: $kind,
                        value: other.to_string(),
                        allowed: $allowed,
                    }),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(index: $name) -> u8 {
                index.get()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.get())
            }
        }

        impl FromStr for $name {
            type Err = IndexError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value: u8 = s.trim().parse().map_err(|_| IndexError {
                    kind: $kind,
                    value: s.to_string(),
                    allowed: $allowed,
                })?;
                $name::try_from(value)
            }
        }
    };
}

index_enum!(
    /// Identifies one wayside sensor platform
    WaysideIndex, "wayside", "1, 2, 3", {
        Wayside1 = 1,
        Wayside2 = 2,
        Wayside3 = 3,
    }
);

index_enum!(
    /// Identifies one camera slot on a wayside
    CameraIndex, "camera", "1, 2, 3", {
        Camera1 = 1,
        Camera2 = 2,
        Camera3 = 3,
    }
);

index_enum!(
    /// Identifies one lidar slot on a wayside
    LidarIndex, "lidar", "1", {
        Lidar1 = 1,
    }
);

impl WaysideIndex {
    /// Key used by the camera-mapping document, e.g. `wayside2`
    pub fn key(self) -> String {
        format!("wayside{}", self.get())
    }
}

// =============================================================================
// Session Types
// =============================================================================

/// One physical sensor platform and the address it is reachable at
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Host {
    pub index: WaysideIndex,
    pub address: String,
}

/// A named fleet topology
///
/// Host order is significant: it is zipped positionally against recipe
/// device lists and delivery targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub hosts: Vec<Host>,
}

impl Session {
    /// Check the invariants the document format cannot express
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.hosts.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "session '{}' has no hosts",
                self.name
            )));
        }

        let mut seen = BTreeSet::new();
        for host in &self.hosts {
            if !seen.insert(host.index) {
                return Err(ConfigError::Invalid(format!(
                    "session '{}' lists wayside{} more than once",
                    self.name, host.index
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Recipe Types
// =============================================================================

/// Devices one wayside must activate for a recipe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceList {
    pub index: WaysideIndex,
    #[serde(default)]
    pub camera_list: Vec<CameraIndex>,
    #[serde(default)]
    pub lidar_list: Vec<LidarIndex>,
}

impl DeviceList {
    pub fn selection(&self) -> DeviceSelection {
        DeviceSelection::new(
            self.camera_list.iter().copied(),
            self.lidar_list.iter().copied(),
        )
    }
}

/// Wall-clock time of day at which recording begins (`HH:MM:SS`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Since(NaiveTime);

impl Since {
    pub const FORMAT: &'static str = "%H:%M:%S";

    pub fn new(time: NaiveTime) -> Self {
        // whole-second granularity
        Self(time.with_nanosecond(0).unwrap_or(time))
    }

    pub fn time(self) -> NaiveTime {
        self.0
    }
}

impl FromStr for Since {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NaiveTime::parse_from_str(s.trim(), Self::FORMAT)
            .map(Since)
            .map_err(|e| ConfigError::Invalid(format!("since '{}' is not HH:MM:SS: {}", s, e)))
    }
}

impl TryFrom<String> for Since {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Since> for String {
    fn from(since: Since) -> String {
        since.to_string()
    }
}

impl fmt::Display for Since {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(Self::FORMAT))
    }
}

/// A named capture plan for every wayside of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    pub name: String,
    pub timeout_secs: u64,
    pub device_lists: Vec<DeviceList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<Since>,
}

impl Recipe {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timeout_secs == 0 {
            return Err(ConfigError::Invalid(format!(
                "recipe '{}' must have a positive timeout_secs",
                self.name
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Device Selection
// =============================================================================

/// The de-duplicated set of devices one recording session activates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSelection {
    pub cameras: BTreeSet<CameraIndex>,
    pub lidars: BTreeSet<LidarIndex>,
}

impl DeviceSelection {
    pub fn new(
        cameras: impl IntoIterator<Item = CameraIndex>,
        lidars: impl IntoIterator<Item = LidarIndex>,
    ) -> Self {
        Self {
            cameras: cameras.into_iter().collect(),
            lidars: lidars.into_iter().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cameras.is_empty() && self.lidars.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cameras.len() + self.lidars.len()
    }
}

// =============================================================================
// Camera Mapping
// =============================================================================

/// Number of physical camera entries every wayside maps
pub const CAMERAS_PER_WAYSIDE: usize = 3;

/// Directory holding stable V4L2 device links
pub const V4L_BY_ID_DIR: &str = "/dev/v4l/by-id";

/// Table from `wayside{N}` to the ordered physical camera identifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraMapping(BTreeMap<String, Vec<String>>);

impl CameraMapping {
    pub fn new(entries: BTreeMap<String, Vec<String>>) -> Self {
        Self(entries)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, devices) in &self.0 {
            if devices.len() != CAMERAS_PER_WAYSIDE {
                return Err(ConfigError::Invalid(format!(
                    "camera mapping for '{}' has {} entries, expected {}",
                    key,
                    devices.len(),
                    CAMERAS_PER_WAYSIDE
                )));
            }
        }
        Ok(())
    }

    /// Resolve the device paths of one wayside
    pub fn devices_for(&self, wayside: WaysideIndex) -> Result<CameraDevices, ConfigError> {
        let key = wayside.key();
        let ids = self
            .0
            .get(&key)
            .ok_or_else(|| ConfigError::MissingMapping(key.clone()))?;
        if ids.len() != CAMERAS_PER_WAYSIDE {
            return Err(ConfigError::Invalid(format!(
                "camera mapping for '{}' has {} entries, expected {}",
                key,
                ids.len(),
                CAMERAS_PER_WAYSIDE
            )));
        }
        Ok(CameraDevices(ids.iter().map(|id| resolve_device(id)).collect()))
    }
}

fn resolve_device(id: &str) -> PathBuf {
    let path = Path::new(id);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        Path::new(V4L_BY_ID_DIR).join(id)
    }
}

/// Physical device paths of one wayside, indexed by `CameraIndex`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraDevices(Vec<PathBuf>);

impl CameraDevices {
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self(paths)
    }

    pub fn path(&self, camera: CameraIndex) -> Option<&Path> {
        self.0.get(usize::from(camera.get()) - 1).map(PathBuf::as_path)
    }
}
