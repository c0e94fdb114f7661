//! Owned process groups
//!
//! A `ProcessGroup` is the only owner of the children it spawns. Each child
//! runs in its own OS process group so shell wrappers and whatever they start
//! are stopped together. Teardown is the two-step graceful-stop-then-kill
//! sequence and is idempotent.

use super::{CommandSpec, ExitSummary};
use serde::{Deserialize, Serialize};
use std::io;
use std::time::Duration;
use tokio::process::Child;
use tokio_util::sync::CancellationToken;

/// Time children get to exit after the graceful stop before they are killed
pub const DEFAULT_GRACE: Duration = Duration::from_millis(500);

/// Final report for one child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    /// Name given at spawn time
    pub name: String,

    /// OS process id (also the process group id)
    pub pid: Option<u32>,

    /// How the process ended
    pub exit: ExitSummary,

    /// Exited on its own while it was expected to keep running
    pub exited_early: bool,
}

/// Result of waiting on every member of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Every member exited on its own
    Completed,
    /// The cancellation token fired first
    Interrupted,
}

struct Member {
    name: String,
    child: Child,
    pid: Option<u32>,
    exit: Option<ExitSummary>,
    exited_early: bool,
}

impl Member {
    /// Record the exit status if the child has already finished
    fn still_running(&mut self) -> bool {
        if self.exit.is_some() {
            return false;
        }
        match self.child.try_wait() {
            Ok(Some(status)) => {
                self.exit = Some(status.into());
                false
            }
            Ok(None) => true,
            Err(e) => {
                tracing::warn!("Failed to poll process '{}': {}", self.name, e);
                true
            }
        }
    }

    async fn reap(&mut self) {
        if self.exit.is_some() {
            return;
        }
        self.exit = Some(match self.child.wait().await {
            Ok(status) => status.into(),
            Err(e) => {
                tracing::warn!("Failed to wait for process '{}': {}", self.name, e);
                ExitSummary::Unknown
            }
        });
    }

    fn terminate(&mut self) {
        #[cfg(unix)]
        self.signal_group(libc::SIGTERM);

        #[cfg(not(unix))]
        let _ = self.child.start_kill();
    }

    fn kill(&mut self) {
        #[cfg(unix)]
        self.signal_group(libc::SIGKILL);

        // the leader itself is gone once reaped
        if self.exit.is_none() {
            let _ = self.child.start_kill();
        }
    }

    #[cfg(unix)]
    fn signal_group(&self, signal: libc::c_int) {
        let Some(pid) = self.pid else {
            return;
        };
        let rc = unsafe { libc::kill(-(pid as libc::pid_t), signal) };
        if rc != 0 {
            tracing::debug!(
                "Signal {} to process group {} ('{}') failed: {}",
                signal,
                pid,
                self.name,
                io::Error::last_os_error()
            );
        }
    }

    fn into_report(self) -> ProcessReport {
        ProcessReport {
            name: self.name,
            pid: self.pid,
            exit: self.exit.unwrap_or(ExitSummary::Unknown),
            exited_early: self.exited_early,
        }
    }
}

/// Exclusively owned set of child processes
pub struct ProcessGroup {
    members: Vec<Member>,
    grace: Duration,
}

impl ProcessGroup {
    pub fn new() -> Self {
        Self::with_grace(DEFAULT_GRACE)
    }

    pub fn with_grace(grace: Duration) -> Self {
        Self {
            members: Vec::new(),
            grace,
        }
    }

    /// Spawn `cmd` as a new member in its own process group
    pub fn spawn(&mut self, name: impl Into<String>, cmd: &CommandSpec) -> io::Result<Option<u32>> {
        let name = name.into();
        let mut command = cmd.to_command();
        command.kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let child = command.spawn()?;
        let pid = child.id();
        tracing::debug!("Spawned '{}' (pid {:?}): {}", name, pid, cmd);

        self.members.push(Member {
            name,
            child,
            pid,
            exit: None,
            exited_early: false,
        });
        Ok(pid)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Number of members that have not exited yet
    pub fn live_count(&mut self) -> usize {
        self.members
            .iter_mut()
            .map(Member::still_running)
            .filter(|running| *running)
            .count()
    }

    /// Collect members that exited since the last poll while they were expected to run
    pub fn poll_exits(&mut self) -> Vec<ProcessReport> {
        let mut exited = Vec::new();
        for member in &mut self.members {
            if member.exit.is_none() && !member.still_running() {
                member.exited_early = true;
                exited.push(ProcessReport {
                    name: member.name.clone(),
                    pid: member.pid,
                    exit: member.exit.unwrap_or(ExitSummary::Unknown),
                    exited_early: true,
                });
            }
        }
        exited
    }

    /// Wait for every member to exit, unless `cancel` fires first
    pub async fn wait_all(&mut self, cancel: &CancellationToken) -> WaitOutcome {
        for member in &mut self.members {
            if member.exit.is_some() {
                continue;
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return WaitOutcome::Interrupted,
                _ = member.reap() => {}
            }
        }
        WaitOutcome::Completed
    }

    /// Stop every member: graceful stop, grace period, kill, reap
    ///
    /// Returns the reports of the members torn down by this call; later calls
    /// return an empty list.
    pub async fn teardown(&mut self) -> Vec<ProcessReport> {
        if self.members.is_empty() {
            return Vec::new();
        }

        let mut stopping = 0;
        for member in &mut self.members {
            let unobserved = member.exit.is_none();
            if member.still_running() {
                member.terminate();
                stopping += 1;
            } else if unobserved {
                // died since the last poll, while it was still expected to run
                member.exited_early = true;
            }
        }
        tracing::debug!(
            "Teardown: sent graceful stop to {} of {} processes",
            stopping,
            self.members.len()
        );

        let grace = self.grace;
        let members = &mut self.members;
        let _ = tokio::time::timeout(grace, async {
            for member in members.iter_mut() {
                member.reap().await;
            }
        })
        .await;

        // A reaped leader can leave group members behind, so every group is killed
        for member in &mut self.members {
            if member.exit.is_none() {
                tracing::debug!("Teardown: killing '{}' after grace period", member.name);
            }
            member.kill();
        }
        for member in &mut self.members {
            member.reap().await;
        }

        self.members.drain(..).map(Member::into_report).collect()
    }
}

impl Default for ProcessGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        for member in &mut self.members {
            if member.still_running() {
                tracing::warn!("Process '{}' still running at drop, killing", member.name);
                member.kill();
            }
        }
    }
}
