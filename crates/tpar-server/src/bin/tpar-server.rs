use clap::Parser;
use tpar_server::config::{CliOptions, ServerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliOptions::parse();
    let config = ServerConfig::load(cli)?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&config.log_filter))
        .init();

    tpar_server::run(config).await
}
