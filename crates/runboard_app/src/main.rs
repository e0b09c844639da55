mod cli;
mod commands;
mod logging;
mod render;

use std::process::ExitCode;

use clap::Parser;
use client_logging::client_error;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    logging::initialize(cli.log, cli.level());

    match commands::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            client_error!("{err:#}");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
