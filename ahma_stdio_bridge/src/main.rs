use ahma_stdio_bridge::{BridgeConfig, Cli, logging::init_logging, run_stdio};
use clap::Parser;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, !cli.log_to_stderr);

    let config = BridgeConfig::from_cli(&cli)?;
    tracing::info!("Proxying stdio to {}", config.endpoint);

    if let Err(e) = run_stdio(config).await {
        tracing::error!("Bridge stopped: {}", e);
        return Err(e.into());
    }
    Ok(())
}
