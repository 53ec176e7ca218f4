use clap::Parser;
use figment::providers::{Env, Format as _, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Parser)]
#[command(name = "tpar-server", about = "Run a tpar job queue server")]
pub struct CliOptions {
    /// Address to bind both listeners on.
    #[arg(short = 'H', long)]
    pub host: Option<String>,

    /// Port clients connect to.
    #[arg(short = 'p', long)]
    pub client_port: Option<u16>,

    /// Port workers connect to.
    #[arg(short = 'w', long)]
    pub worker_port: Option<u16>,

    /// Path to a TOML config file, merged under CLI flags and env vars.
    #[arg(long)]
    pub config_file: Option<String>,

    /// tracing-subscriber env-filter directive, e.g. "tpar_server=debug".
    #[arg(long)]
    pub log_filter: Option<String>,
}

#[skip_serializing_none]
#[derive(Default, Serialize)]
struct ConfigOptions {
    host: Option<String>,
    client_port: Option<u16>,
    worker_port: Option<u16>,
    log_filter: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub client_port: u16,
    pub worker_port: u16,
    pub log_filter: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            client_port: 7760,
            worker_port: 7761,
            log_filter: "info".to_string(),
        }
    }
}

impl ServerConfig {
    /// Layers defaults, an optional TOML file, `TPAR_SERVER_*` environment
    /// variables, and CLI flags, in ascending order of precedence — the same
    /// order the client binary in the broker/worker corpus this is modeled
    /// on uses.
    pub fn load(cli: CliOptions) -> anyhow::Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(ServerConfig::default()));

        if let Some(path) = &cli.config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("TPAR_SERVER_"));

        let overrides = ConfigOptions {
            host: cli.host,
            client_port: cli.client_port,
            worker_port: cli.worker_port,
            log_filter: cli.log_filter,
        };
        figment = figment.merge(Serialized::globals(overrides));

        Ok(figment.extract()?)
    }
}
