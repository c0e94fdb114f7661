//! `dispatch`: turn a recipe into one `record` command per host

use super::fanout_exit_code;
use crate::config::{load_recipe, load_session, require_absolute};
use crate::dispatch::{dispatch, DispatchOptions, DEFAULT_PROGRAM, DEFAULT_WORKDIR};
use crate::process::{run_parallel, DEFAULT_GRACE};
use crate::utils::{exit_code, AppResult};
use clap::{Args, ValueEnum};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

/// How printed commands are formatted
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// One shell command line per host
    Lines,
    /// JSON array of per-host commands
    Json,
}

#[derive(Args, Debug, Clone)]
pub struct DispatchArgs {
    /// Session config (json5)
    #[arg(short, long)]
    pub session: PathBuf,

    /// Recipe file (json5)
    #[arg(short, long)]
    pub recipe: PathBuf,

    /// Artifact root on every host. Absolute path is mandatory.
    #[arg(short, long, env = "WAYSIDE_OUTPUT_DIR")]
    pub output_dir: PathBuf,

    /// Camera id mapping file on every host
    #[arg(short, long, env = "WAYSIDE_MAPPING")]
    pub mapping: Option<PathBuf>,

    /// Shell prefix that runs this tool on the hosts
    #[arg(long, env = "WAYSIDE_PROGRAM", default_value = DEFAULT_PROGRAM)]
    pub program: String,

    /// Fail when a device list's index differs from its host's
    #[arg(long)]
    pub strict_index: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Lines)]
    pub format: OutputFormat,

    /// Run the commands on the hosts over ssh instead of printing them
    #[arg(long)]
    pub ssh: bool,

    /// Remote working directory for --ssh
    #[arg(long, default_value = DEFAULT_WORKDIR)]
    pub workdir: String,
}

pub async fn run(args: DispatchArgs, cancel: &CancellationToken) -> AppResult<u8> {
    let session = load_session(&args.session)?;
    let recipe = load_recipe(&args.recipe)?;
    require_absolute(&args.output_dir)?;

    let options = DispatchOptions {
        output_dir: args.output_dir,
        mapping: args.mapping,
        program: args.program,
        strict_index: args.strict_index,
    };
    let commands = dispatch(&session, &recipe, &options)?;

    if args.ssh {
        let jobs = commands.iter().map(|c| c.ssh_job(&args.workdir)).collect();
        let report = run_parallel(jobs, DEFAULT_GRACE, cancel).await;
        tracing::info!("Recipe sent.");
        return Ok(fanout_exit_code(&report));
    }

    match args.format {
        OutputFormat::Lines => {
            for command in &commands {
                println!("{}", command.command_line());
            }
        }
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&commands)?),
    }
    Ok(exit_code::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::AppError;
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn documents(device_lists: &str) -> (TempDir, DispatchArgs) {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("session.json5"),
            "{name: 'track', hosts: [{index: 1, address: 'a'}, {index: 2, address: 'b'}]}",
        )
        .unwrap();
        fs::write(
            dir.path().join("recipe.json5"),
            format!("{{name: 'r', timeout_secs: 5, device_lists: {}}}", device_lists),
        )
        .unwrap();
        let args = DispatchArgs {
            session: dir.path().join("session.json5"),
            recipe: dir.path().join("recipe.json5"),
            output_dir: PathBuf::from("/data"),
            mapping: None,
            program: DEFAULT_PROGRAM.to_string(),
            strict_index: false,
            format: OutputFormat::Json,
            ssh: false,
            workdir: DEFAULT_WORKDIR.to_string(),
        };
        (dir, args)
    }

    const TWO_LISTS: &str = "[{index: 1, lidar_list: [1]}, {index: 2, camera_list: [1]}]";

    #[tokio::test]
    async fn test_prints_commands() {
        let (_dir, args) = documents(TWO_LISTS);
        let code = run(args.clone(), &CancellationToken::new()).await.unwrap();
        assert_eq!(code, exit_code::SUCCESS);

        let lines = DispatchArgs {
            format: OutputFormat::Lines,
            ..args
        };
        assert_eq!(run(lines, &CancellationToken::new()).await.unwrap(), exit_code::SUCCESS);
    }

    #[tokio::test]
    async fn test_relative_output_dir_is_invalid() {
        let (_dir, mut args) = documents(TWO_LISTS);
        args.output_dir = PathBuf::from("out");
        let err = run(args, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert_eq!(err.exit_code(), exit_code::INVALID);
    }

    #[tokio::test]
    async fn test_length_mismatch_is_invalid() {
        let (_dir, args) = documents("[{index: 1, lidar_list: [1]}]");
        let err = run(args, &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Dispatch(_)));
        assert_eq!(err.exit_code(), exit_code::INVALID);
    }
}
