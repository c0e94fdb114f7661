//! Child process primitives
//!
//! - `CommandSpec` describes a process without spawning it
//! - `ProcessGroup` exclusively owns a set of spawned children and tears them down
//! - `fanout` runs one command per host, sequentially or concurrently

pub mod fanout;
pub mod group;

pub use fanout::{run_parallel, run_sequential, FanoutReport, HostJob, HostOutcome, HostStatus};
pub use group::{ProcessGroup, ProcessReport, WaitOutcome, DEFAULT_GRACE};

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Program plus arguments, renderable as a shell command line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Run `script` through bash
    pub fn shell(script: impl Into<String>) -> Self {
        Self::new("bash").arg("-c").arg(script)
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Build a tokio command; stdin is detached, stdout/stderr are inherited
    pub fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());
        command
    }

    /// Render as a single shell command line
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .map(shell_quote)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.command_line())
    }
}

/// Quote `word` for a POSIX shell when it contains anything beyond safe characters
pub fn shell_quote(word: &str) -> Cow<'_, str> {
    let safe = !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=@,+%".contains(c));
    if safe {
        Cow::Borrowed(word)
    } else {
        Cow::Owned(format!("'{}'", word.replace('\'', r"'\''")))
    }
}

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ExitSummary {
    /// Exited with a status code
    Exited { code: i32 },
    /// Terminated by a signal
    Signaled { signal: i32 },
    /// Could not be determined (wait failed)
    Unknown,
}

impl ExitSummary {
    pub fn success(&self) -> bool {
        matches!(self, ExitSummary::Exited { code: 0 })
    }
}

impl From<ExitStatus> for ExitSummary {
    fn from(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitSummary::Exited { code };
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitSummary::Signaled { signal };
            }
        }
        ExitSummary::Unknown
    }
}

impl fmt::Display for ExitSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitSummary::Exited { code } => write!(f, "exit code {}", code),
            ExitSummary::Signaled { signal } => write!(f, "signal {}", signal),
            ExitSummary::Unknown => write!(f, "unknown status"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("/data/rec"), "/data/rec");
        assert_eq!(shell_quote("user@10.0.0.1:/data/"), "user@10.0.0.1:/data/");
        assert_eq!(shell_quote("two words"), "'two words'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_command_line() {
        let cmd = CommandSpec::new("rsync")
            .arg("-azvP")
            .args(["host:/data/", "/srv/my data"]);
        assert_eq!(cmd.command_line(), "rsync -azvP host:/data/ '/srv/my data'");

        let shell = CommandSpec::shell("echo hi && sleep 1");
        assert_eq!(shell.program, "bash");
        assert_eq!(shell.args, vec!["-c", "echo hi && sleep 1"]);
    }
}
