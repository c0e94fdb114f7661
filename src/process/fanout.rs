//! One command per host
//!
//! Runs a list of per-host commands either strictly in order or all at once.
//! A failing host never stops its siblings; an interrupt tears down whatever
//! is in flight before returning.

use super::{CommandSpec, ExitSummary, ProcessGroup, ProcessReport, WaitOutcome};
use crate::config::Host;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A command bound to the host it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostJob {
    pub host: Host,
    pub command: CommandSpec,
}

/// Final state of one host's command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum HostStatus {
    Succeeded,
    Failed { exit: ExitSummary },
    SpawnFailed { message: String },
    /// Never started because of an interrupt
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostOutcome {
    pub host: Host,
    pub command: CommandSpec,
    pub status: HostStatus,
}

impl HostOutcome {
    pub fn succeeded(&self) -> bool {
        self.status == HostStatus::Succeeded
    }
}

/// Per-host outcomes in job order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FanoutReport {
    pub outcomes: Vec<HostOutcome>,
    pub interrupted: bool,
}

impl FanoutReport {
    pub fn failures(&self) -> impl Iterator<Item = &HostOutcome> {
        self.outcomes.iter().filter(|o| !o.succeeded())
    }

    pub fn all_succeeded(&self) -> bool {
        !self.interrupted && self.outcomes.iter().all(HostOutcome::succeeded)
    }
}

fn status_from(report: Option<ProcessReport>) -> HostStatus {
    match report {
        Some(report) if report.exit.success() => HostStatus::Succeeded,
        Some(report) => HostStatus::Failed { exit: report.exit },
        None => HostStatus::Failed {
            exit: ExitSummary::Unknown,
        },
    }
}

fn log_outcome(outcome: &HostOutcome) {
    let key = outcome.host.index.key();
    match &outcome.status {
        HostStatus::Succeeded => {
            tracing::info!("{} ({}) finished", key, outcome.host.address)
        }
        HostStatus::Failed { exit } => tracing::error!(
            "{} ({}) failed with {}: {}",
            key,
            outcome.host.address,
            exit,
            outcome.command
        ),
        HostStatus::SpawnFailed { message } => tracing::error!(
            "{} ({}) could not be started: {}",
            key,
            outcome.host.address,
            message
        ),
        HostStatus::Skipped => {
            tracing::warn!("{} ({}) skipped", key, outcome.host.address)
        }
    }
}

/// Run jobs one at a time in order
pub async fn run_sequential(
    jobs: Vec<HostJob>,
    grace: Duration,
    cancel: &CancellationToken,
) -> FanoutReport {
    let mut outcomes = Vec::with_capacity(jobs.len());
    let mut interrupted = false;

    for HostJob { host, command } in jobs {
        if interrupted || cancel.is_cancelled() {
            interrupted = true;
            let outcome = HostOutcome {
                host,
                command,
                status: HostStatus::Skipped,
            };
            log_outcome(&outcome);
            outcomes.push(outcome);
            continue;
        }

        tracing::info!("{} ({}): {}", host.index.key(), host.address, command);
        let mut group = ProcessGroup::with_grace(grace);
        let status = match group.spawn(host.index.key(), &command) {
            Ok(_) => {
                if group.wait_all(cancel).await == WaitOutcome::Interrupted {
                    interrupted = true;
                }
                status_from(group.teardown().await.pop())
            }
            Err(e) => HostStatus::SpawnFailed {
                message: e.to_string(),
            },
        };

        let outcome = HostOutcome {
            host,
            command,
            status,
        };
        log_outcome(&outcome);
        outcomes.push(outcome);
    }

    FanoutReport {
        outcomes,
        interrupted,
    }
}

/// Launch every job at once and wait for all of them
pub async fn run_parallel(
    jobs: Vec<HostJob>,
    grace: Duration,
    cancel: &CancellationToken,
) -> FanoutReport {
    let mut group = ProcessGroup::with_grace(grace);
    let mut statuses: Vec<Option<HostStatus>> = vec![None; jobs.len()];
    let mut spawned = Vec::with_capacity(jobs.len());

    for (position, job) in jobs.iter().enumerate() {
        tracing::info!("{} ({}): {}", job.host.index.key(), job.host.address, job.command);
        match group.spawn(job.host.index.key(), &job.command) {
            Ok(_) => spawned.push(position),
            Err(e) => {
                statuses[position] = Some(HostStatus::SpawnFailed {
                    message: e.to_string(),
                })
            }
        }
    }

    let interrupted = group.wait_all(cancel).await == WaitOutcome::Interrupted;
    if interrupted {
        tracing::warn!("Interrupted, stopping {} in-flight commands", group.live_count());
    }

    // teardown drains members in spawn order
    for (position, report) in spawned.into_iter().zip(group.teardown().await) {
        statuses[position] = Some(status_from(Some(report)));
    }

    let outcomes = jobs
        .into_iter()
        .zip(statuses)
        .map(|(HostJob { host, command }, status)| {
            let outcome = HostOutcome {
                host,
                command,
                status: status.unwrap_or(HostStatus::Failed {
                    exit: ExitSummary::Unknown,
                }),
            };
            log_outcome(&outcome);
            outcome
        })
        .collect();

    FanoutReport {
        outcomes,
        interrupted,
    }
}
