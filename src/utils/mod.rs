//! Shared utilities

pub mod error;
pub mod signal;

pub use error::{exit_code, AppError, AppResult};
pub use signal::shutdown_token;
