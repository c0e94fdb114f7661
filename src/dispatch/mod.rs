//! Recipe dispatch
//!
//! Fans one recipe out over a session's hosts. Host `i` is paired with
//! device list `i`: the join is positional, so both sequences must have the
//! same length. Index fields are only cross-checked when asked to.

use crate::config::{CameraIndex, Host, LidarIndex, Recipe, Session, Since, WaysideIndex};
use crate::process::{shell_quote, CommandSpec, HostJob};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

/// Program prefix of the rendered commands
pub const DEFAULT_PROGRAM: &str = "wayside-remote";

/// Working directory on the remote hosts
pub const DEFAULT_WORKDIR: &str = "/home/newslab/LCTK";

/// Command `exec` sends when none is given
pub const DEFAULT_EXEC_COMMAND: &str = "ip address";

/// Dispatch-related errors
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Session has {hosts} hosts but the recipe has {device_lists} device lists")]
    Correspondence { hosts: usize, device_lists: usize },

    #[error("Position {position}: host is wayside{host} but its device list is for wayside{device_list}")]
    IndexMismatch {
        position: usize,
        host: WaysideIndex,
        device_list: WaysideIndex,
    },
}

/// Dispatch settings that do not come from the documents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOptions {
    /// Artifact root on every host
    pub output_dir: PathBuf,

    /// Camera-mapping document path on every host
    pub mapping: Option<PathBuf>,

    /// Shell prefix that runs this tool on the remote host
    pub program: String,

    /// Fail instead of warn when a device list's index differs from its host's
    pub strict_index: bool,
}

impl DispatchOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            mapping: None,
            program: DEFAULT_PROGRAM.to_string(),
            strict_index: false,
        }
    }
}

/// Arguments of one remote `record` invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordInvocation {
    pub name: String,
    pub index: WaysideIndex,
    pub cameras: Vec<CameraIndex>,
    pub lidars: Vec<LidarIndex>,
    pub timeout_secs: u64,
    pub since: Option<Since>,
    pub output_dir: PathBuf,
    pub mapping: Option<PathBuf>,
}

impl RecordInvocation {
    /// Argument vector, starting with the `record` subcommand
    ///
    /// Empty device lists are left out entirely.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            "record".to_string(),
            "--name".to_string(),
            self.name.clone(),
            "--index".to_string(),
            self.index.to_string(),
        ];
        if !self.cameras.is_empty() {
            args.push("--camera".to_string());
            args.extend(self.cameras.iter().map(ToString::to_string));
        }
        if !self.lidars.is_empty() {
            args.push("--lidar".to_string());
            args.extend(self.lidars.iter().map(ToString::to_string));
        }
        args.push("--timeout".to_string());
        args.push(self.timeout_secs.to_string());
        if let Some(since) = self.since {
            args.push("--since".to_string());
            args.push(since.to_string());
        }
        args.push("--output-dir".to_string());
        args.push(self.output_dir.to_string_lossy().into_owned());
        if let Some(mapping) = &self.mapping {
            args.push("--mapping".to_string());
            args.push(mapping.to_string_lossy().into_owned());
        }
        args
    }
}

/// The command one host must run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCommand {
    pub host: Host,
    pub program: String,
    pub invocation: RecordInvocation,
}

impl RemoteCommand {
    /// Full shell command line; `program` is used verbatim as a prefix
    pub fn command_line(&self) -> String {
        let args = self
            .invocation
            .to_args()
            .iter()
            .map(|arg| shell_quote(arg).into_owned())
            .collect::<Vec<_>>()
            .join(" ");
        format!("{} {}", self.program, args)
    }

    /// Run the command on the host over ssh, from `workdir`
    pub fn ssh_job(&self, workdir: &str) -> HostJob {
        ssh_job(&self.host, workdir, &self.command_line())
    }
}

/// `ssh -tt ADDRESS 'cd WORKDIR && COMMAND'` for one host
pub fn ssh_job(host: &Host, workdir: &str, command_line: &str) -> HostJob {
    let remote = format!("cd {} && {}", shell_quote(workdir), command_line);
    HostJob {
        host: host.clone(),
        command: CommandSpec::new("ssh")
            .arg("-tt")
            .arg(host.address.as_str())
            .arg(remote),
    }
}

/// The same shell command for every host of `session`, in host order
pub fn exec_jobs(session: &Session, command_line: &str, workdir: &str) -> Vec<HostJob> {
    session
        .hosts
        .iter()
        .map(|host| ssh_job(host, workdir, command_line))
        .collect()
}

/// Space-joined ascending indices, e.g. `1 2`
pub fn render_indices<T: Display>(indices: impl IntoIterator<Item = T>) -> String {
    indices
        .into_iter()
        .map(|i| i.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Produce one command per host, in host order
pub fn dispatch(
    session: &Session,
    recipe: &Recipe,
    options: &DispatchOptions,
) -> Result<Vec<RemoteCommand>, DispatchError> {
    if session.hosts.len() != recipe.device_lists.len() {
        return Err(DispatchError::Correspondence {
            hosts: session.hosts.len(),
            device_lists: recipe.device_lists.len(),
        });
    }

    let mut commands = Vec::with_capacity(session.hosts.len());
    for (position, (host, list)) in session.hosts.iter().zip(&recipe.device_lists).enumerate() {
        if list.index != host.index {
            if options.strict_index {
                return Err(DispatchError::IndexMismatch {
                    position,
                    host: host.index,
                    device_list: list.index,
                });
            }
            tracing::warn!(
                "Position {}: device list for wayside{} goes to wayside{} ({})",
                position,
                list.index,
                host.index,
                host.address
            );
        }

        let selection = list.selection();
        if options.mapping.is_none() && !selection.cameras.is_empty() {
            tracing::warn!(
                "{} ({}) records cameras without --mapping; the host needs WAYSIDE_MAPPING",
                host.index.key(),
                host.address
            );
        }
        tracing::debug!(
            "{} ({}): cameras [{}] lidars [{}]",
            host.index.key(),
            host.address,
            render_indices(&selection.cameras),
            render_indices(&selection.lidars)
        );

        commands.push(RemoteCommand {
            host: host.clone(),
            program: options.program.clone(),
            invocation: RecordInvocation {
                name: recipe.name.clone(),
                index: list.index,
                cameras: selection.cameras.into_iter().collect(),
                lidars: selection.lidars.into_iter().collect(),
                timeout_secs: recipe.timeout_secs,
                since: recipe.since,
                output_dir: options.output_dir.clone(),
                mapping: options.mapping.clone(),
            },
        });
    }

    tracing::info!(
        "Dispatched recipe '{}' to {} hosts of session '{}'",
        recipe.name,
        commands.len(),
        session.name
    );
    Ok(commands)
}
