//! `transfer`: pull every host's artifacts into one directory

use super::fanout_exit_code;
use crate::config::load_session;
use crate::transfer::{transfer, TransferOptions};
use crate::utils::AppResult;
use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug, Clone)]
pub struct TransferArgs {
    /// Session config (json5)
    #[arg(short, long)]
    pub session: PathBuf,

    /// Source directory on every host
    #[arg(long)]
    pub source: PathBuf,

    /// Local target directory
    #[arg(long)]
    pub target: PathBuf,

    /// Copy from all hosts at once
    #[arg(short, long)]
    pub parallel: bool,

    /// Bulk copy program
    #[arg(long, default_value = "rsync")]
    pub rsync: String,

    /// Flags for the copy program
    #[arg(long, num_args = 1.., allow_hyphen_values = true, default_value = "-azvP")]
    pub rsync_args: Vec<String>,

    /// Milliseconds between graceful stop and kill on interrupt
    #[arg(long, default_value_t = 500)]
    pub grace_ms: u64,
}

pub async fn run(args: TransferArgs, cancel: &CancellationToken) -> AppResult<u8> {
    let session = load_session(&args.session)?;
    let options = TransferOptions {
        program: args.rsync,
        args: args.rsync_args,
        parallel: args.parallel,
        grace: Duration::from_millis(args.grace_ms),
    };

    let report = transfer(&session, &args.source, &args.target, &options, cancel).await?;
    Ok(fanout_exit_code(&report))
}
