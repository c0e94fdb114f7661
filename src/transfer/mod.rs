//! Transfer coordinator
//!
//! Pulls every host's artifact tree into one local directory with a bulk
//! copy tool, one copy per host.

use crate::config::{require_absolute, ConfigError, Session};
use crate::process::{run_parallel, run_sequential, CommandSpec, FanoutReport, HostJob, DEFAULT_GRACE};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Transfer-related errors
#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to create target directory {path}: {source}")]
    CreateTarget {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How copies are run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    /// Bulk copy program
    pub program: String,

    /// Flags placed before the source and target
    pub args: Vec<String>,

    /// Run every host's copy at once
    pub parallel: bool,

    /// Grace period for in-flight copies on interrupt
    pub grace: Duration,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            program: "rsync".to_string(),
            args: vec!["-azvP".to_string()],
            parallel: false,
            grace: DEFAULT_GRACE,
        }
    }
}

/// `{address}:{source}/`, so the copy takes the directory's contents
fn remote_source(address: &str, source: &Path) -> String {
    let source = source.to_string_lossy();
    format!("{}:{}/", address, source.trim_end_matches('/'))
}

/// One copy command per host, in host order
pub fn plan(session: &Session, source: &Path, target: &Path, options: &TransferOptions) -> Vec<HostJob> {
    session
        .hosts
        .iter()
        .map(|host| HostJob {
            host: host.clone(),
            command: CommandSpec::new(options.program.as_str())
                .args(options.args.iter().map(String::as_str))
                .arg(remote_source(&host.address, source))
                .arg(target.to_string_lossy()),
        })
        .collect()
}

/// Copy `source` from every host of `session` into `target`
///
/// A failing host never stops the others; per-host results are in the
/// returned report.
pub async fn transfer(
    session: &Session,
    source: &Path,
    target: &Path,
    options: &TransferOptions,
    cancel: &CancellationToken,
) -> Result<FanoutReport, TransferError> {
    require_absolute(source)?;
    require_absolute(target)?;

    fs::create_dir_all(target).map_err(|source| TransferError::CreateTarget {
        path: target.to_path_buf(),
        source,
    })?;

    let jobs = plan(session, source, target, options);
    tracing::info!(
        "Begin syncing {} hosts into {:?} ({})",
        jobs.len(),
        target,
        if options.parallel { "parallel" } else { "sequential" }
    );

    let report = if options.parallel {
        run_parallel(jobs, options.grace, cancel).await
    } else {
        run_sequential(jobs, options.grace, cancel).await
    };

    if report.interrupted {
        tracing::warn!("Transfer interrupted");
    } else {
        tracing::info!(
            "Finished: {} of {} hosts failed",
            report.failures().count(),
            report.outcomes.len()
        );
    }
    Ok(report)
}
