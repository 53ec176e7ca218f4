use clap::Parser;
use tpar_worker::config::{CliOptions, WorkerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliOptions::parse();
    let config = WorkerConfig::load(cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    tpar_worker::run(config).await
}
