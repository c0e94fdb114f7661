//! `exec`: run one shell command on every host of a session

use super::fanout_exit_code;
use crate::config::load_session;
use crate::dispatch::{exec_jobs, DEFAULT_EXEC_COMMAND, DEFAULT_WORKDIR};
use crate::process::{run_parallel, DEFAULT_GRACE};
use crate::utils::AppResult;
use clap::Args;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Args, Debug, Clone)]
pub struct ExecArgs {
    /// Session config (json5)
    #[arg(short, long)]
    pub session: PathBuf,

    /// Shell command to run on each host
    #[arg(short, long, default_value = DEFAULT_EXEC_COMMAND)]
    pub command: String,

    /// Remote working directory
    #[arg(long, default_value = DEFAULT_WORKDIR)]
    pub workdir: String,
}

pub async fn run(args: ExecArgs, cancel: &CancellationToken) -> AppResult<u8> {
    let session = load_session(&args.session)?;
    let jobs = exec_jobs(&session, &args.command, &args.workdir);
    tracing::info!(
        "Running '{}' on {} hosts of session '{}'",
        args.command,
        jobs.len(),
        session.name
    );

    let report = run_parallel(jobs, DEFAULT_GRACE, cancel).await;
    Ok(fanout_exit_code(&report))
}
