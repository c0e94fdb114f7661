//! Configuration document loading
//!
//! Session, recipe and camera-mapping documents are JSON5 files. Every path
//! handed to the loader must be absolute, and each document is checked
//! against its invariants before it is returned.

use super::schema::{CameraMapping, Recipe, Session};
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON5 parsing error in {path}: {source}")]
    Json5 {
        path: PathBuf,
        #[source]
        source: json5::Error,
    },

    #[error("Absolute path is mandatory: {0}")]
    RelativePath(PathBuf),

    #[error("Missing required file: {0}")]
    MissingFile(PathBuf),

    #[error("No camera mapping entry for {0}")]
    MissingMapping(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Fail unless `path` is absolute
pub fn require_absolute(path: &Path) -> Result<(), ConfigError> {
    if path.is_absolute() {
        Ok(())
    } else {
        Err(ConfigError::RelativePath(path.to_path_buf()))
    }
}

fn read_document<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    require_absolute(path)?;
    if !path.exists() {
        return Err(ConfigError::MissingFile(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    json5::from_str(&content).map_err(|source| ConfigError::Json5 {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a session document
pub fn load_session(path: &Path) -> Result<Session, ConfigError> {
    let session: Session = read_document(path)?;
    session.validate()?;

    tracing::debug!(
        "Loaded session '{}' with {} hosts from {:?}",
        session.name,
        session.hosts.len(),
        path
    );
    Ok(session)
}

/// Read a recipe document
pub fn load_recipe(path: &Path) -> Result<Recipe, ConfigError> {
    let recipe: Recipe = read_document(path)?;
    recipe.validate()?;

    tracing::debug!(
        "Loaded recipe '{}' ({} device lists, timeout {}s) from {:?}",
        recipe.name,
        recipe.device_lists.len(),
        recipe.timeout_secs,
        path
    );
    Ok(recipe)
}

/// Read a camera-mapping document
pub fn load_camera_mapping(path: &Path) -> Result<CameraMapping, ConfigError> {
    let mapping: CameraMapping = read_document(path)?;
    mapping.validate()?;
    Ok(mapping)
}
