use clap::Parser;
use figment::providers::{Env, Format as _, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

#[derive(Parser)]
#[command(name = "tpar-worker", about = "Run a tpar worker")]
pub struct CliOptions {
    /// Host the server's worker port is listening on.
    #[arg(short = 'H', long)]
    pub server_host: Option<String>,

    #[arg(short = 'p', long)]
    pub server_port: Option<u16>,

    /// Maximum number of jobs this worker runs at once.
    #[arg(short = 's', long)]
    pub slots: Option<usize>,

    /// Reconnect backoff ceiling, in seconds.
    #[arg(short = 'r', long)]
    pub reconnect_interval_secs: Option<u64>,

    #[arg(long)]
    pub config_file: Option<String>,

    #[arg(long)]
    pub log_filter: Option<String>,
}

#[skip_serializing_none]
#[derive(Default, Serialize)]
struct ConfigOptions {
    server_host: Option<String>,
    server_port: Option<u16>,
    slots: Option<usize>,
    reconnect_interval_secs: Option<u64>,
    log_filter: Option<String>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct WorkerConfig {
    pub server_host: String,
    pub server_port: u16,
    pub slots: usize,
    /// Overrides the steady-state reconnect backoff ceiling (spec.md §6's
    /// `-r/--reconnect [SECONDS]`). `None` keeps the library default.
    pub reconnect_interval_secs: Option<u64>,
    pub log_filter: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            server_host: "127.0.0.1".to_string(),
            server_port: 7761,
            slots: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            reconnect_interval_secs: None,
            log_filter: "info".to_string(),
        }
    }
}

impl WorkerConfig {
    pub fn load(cli: CliOptions) -> anyhow::Result<Self> {
        let mut figment = Figment::new().merge(Serialized::defaults(WorkerConfig::default()));

        if let Some(path) = &cli.config_file {
            figment = figment.merge(Toml::file(path));
        }

        figment = figment.merge(Env::prefixed("TPAR_WORKER_"));

        let overrides = ConfigOptions {
            server_host: cli.server_host,
            server_port: cli.server_port,
            slots: cli.slots,
            reconnect_interval_secs: cli.reconnect_interval_secs,
            log_filter: cli.log_filter,
        };
        figment = figment.merge(Serialized::globals(overrides));

        Ok(figment.extract()?)
    }
}
