//! Error types and handling
//!
//! Common error type for the entry points and its exit-code mapping.

use crate::config::ConfigError;
use crate::dispatch::DispatchError;
use crate::recorder::RecordError;
use crate::transfer::TransferError;
use thiserror::Error;

/// Process exit codes
pub mod exit_code {
    pub const SUCCESS: u8 = 0;
    /// Runtime, spawn, I/O or transfer failure
    pub const FAILURE: u8 = 1;
    /// Invalid input, rejected before any side effect
    pub const INVALID: u8 = 2;
    /// Interrupted by a signal, after teardown
    pub const INTERRUPTED: u8 = 130;
}

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Recording error: {0}")]
    Record(#[from] RecordError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AppError {
    /// Exit code this error terminates the process with
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) | AppError::Dispatch(_) => exit_code::INVALID,
            AppError::Record(e) => match e {
                RecordError::Config(_) | RecordError::EmptySelection | RecordError::Schedule { .. } => {
                    exit_code::INVALID
                }
                RecordError::Capture(_)
                | RecordError::Spawn { .. }
                | RecordError::InvalidState(_)
                | RecordError::Io(_) => exit_code::FAILURE,
            },
            AppError::Transfer(TransferError::Config(_)) => exit_code::INVALID,
            AppError::Transfer(TransferError::CreateTarget { .. }) => exit_code::FAILURE,
            AppError::Io(_) | AppError::Serialization(_) => exit_code::FAILURE,
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_exit_codes() {
        let relative = AppError::from(ConfigError::RelativePath(PathBuf::from("out")));
        assert_eq!(relative.exit_code(), exit_code::INVALID);

        let empty = AppError::from(RecordError::EmptySelection);
        assert_eq!(empty.exit_code(), exit_code::INVALID);

        let correspondence = AppError::from(DispatchError::Correspondence {
            hosts: 2,
            device_lists: 3,
        });
        assert_eq!(correspondence.exit_code(), exit_code::INVALID);

        let io = AppError::from(RecordError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk full")));
        assert_eq!(io.exit_code(), exit_code::FAILURE);
    }
}
