use anyhow::Context;
use clap::Parser;
use std::process::ExitCode;
use wayside_remote::commands::Cli;
use wayside_remote::utils::{exit_code, shutdown_token, AppError};

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let cancel = shutdown_token();
    let command = cli.command.name();
    let code = cli
        .run(&cancel)
        .await
        .with_context(|| format!("{} failed", command))?;
    Ok(code)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    wayside_remote::init_tracing(cli.verbose);
    tracing::info!("Starting wayside-remote v{}", env!("CARGO_PKG_VERSION"));

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{:#}", e);
            ExitCode::from(
                e.downcast_ref::<AppError>()
                    .map_or(exit_code::FAILURE, AppError::exit_code),
            )
        }
    }
}
