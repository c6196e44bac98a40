mod cli;

use anyhow::Result;
use clap::Parser;

use cli::DaemonCli;
use logwatch_daemon::logging;
use logwatch_daemon::orchestrator::{Orchestrator, load_config};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();
    let overrides = cli.overrides();

    let config = load_config(&cli.config, &overrides).await?;
    if cli.validate {
        println!("configuration is valid: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %cli.config.display(),
        "logwatch-daemon starting"
    );

    let mut orchestrator = Orchestrator::build(&cli.config, overrides).await?;
    orchestrator.run().await
}
