mod cli;
mod commands;
mod error;

use crate::cli::Cli;
use crate::error::{ErrorKind, Result};
use clap::Parser;
use exn::ResultExt;
use stash_config::Config;
use stash_storage::{FileStorage, SftpStorage};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level())))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::FAILURE
        },
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).or_raise(|| ErrorKind::Config)?;
    let sftp = config.sftp_config(cli.platform.as_deref()).or_raise(|| ErrorKind::Config)?;
    tracing::debug!(platform = %sftp.platform, host = %sftp.host, port = sftp.port, "Using storage platform");

    let base_path = sftp.base_path.clone();
    let storage = SftpStorage::new(sftp);
    let result = commands::execute(cli.command, &storage, &base_path, &mut std::io::stdout()).await;
    storage.close();
    result
}
