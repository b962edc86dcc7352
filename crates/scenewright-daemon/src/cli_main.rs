use clap::Parser;
use scenewright_daemon::cli::{self, Cli};
use scenewright_daemon::logging;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    logging::init("scenewright=warn")?;
    cli::run(Cli::parse()).await?.finish()
}
