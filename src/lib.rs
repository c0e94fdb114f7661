//! wayside-remote - synchronized recording across a fleet of wayside hosts.
//!
//! This is the library crate behind the `wayside-remote` binary. It provides
//! recipe dispatch, the per-host recording session and data transfer.

pub mod capture;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod process;
pub mod recorder;
pub mod transfer;
pub mod utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging
///
/// `RUST_LOG` takes precedence over `verbose`.
pub fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "wayside_remote=debug"
    } else {
        "wayside_remote=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
