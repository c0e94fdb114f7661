//! Command-line entry points
//!
//! One subcommand per stage of a field run: `dispatch` a recipe to the
//! hosts, `record` on each host, `transfer` the results back. `exec` runs
//! an ad-hoc command everywhere.

pub mod dispatch;
pub mod exec;
pub mod record;
pub mod transfer;

use crate::process::FanoutReport;
use crate::utils::{exit_code, AppResult};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "wayside-remote", version, about = "Synchronized multi-wayside sensor recording")]
pub struct Cli {
    /// Debug-level logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Record this host's devices for one session
    Record(record::RecordArgs),
    /// Derive one record command per host from a recipe
    Dispatch(dispatch::DispatchArgs),
    /// Copy recorded data from every host
    Transfer(transfer::TransferArgs),
    /// Run one shell command on every host of a session
    Exec(exec::ExecArgs),
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::Record(_) => "record",
            Command::Dispatch(_) => "dispatch",
            Command::Transfer(_) => "transfer",
            Command::Exec(_) => "exec",
        }
    }
}

impl Cli {
    pub async fn run(self, cancel: &CancellationToken) -> AppResult<u8> {
        match self.command {
            Command::Record(args) => record::run(args, cancel).await,
            Command::Dispatch(args) => dispatch::run(args, cancel).await,
            Command::Transfer(args) => transfer::run(args, cancel).await,
            Command::Exec(args) => exec::run(args, cancel).await,
        }
    }
}

/// 130 if interrupted, 1 if any host failed, else 0
pub fn fanout_exit_code(report: &FanoutReport) -> u8 {
    if report.interrupted {
        exit_code::INTERRUPTED
    } else if report.failures().next().is_some() {
        exit_code::FAILURE
    } else {
        exit_code::SUCCESS
    }
}
