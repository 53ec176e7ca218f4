//! The `tpar` command-line surface (spec.md §6): one subcommand per
//! operation, common `-H/--host` and `-p/--port` flags, and a single
//! positional filter-expression argument for `status`/`kill`/`rerun`.

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(name = "tpar", about = "Submit and inspect jobs on a tpar server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run the job queue server.
    Server(ServerArgs),
    /// Run a worker that pulls and executes jobs from a server.
    Worker(WorkerArgs),
    /// Submit a job to the server.
    Enqueue(EnqueueArgs),
    /// List jobs matching a filter expression.
    Status(FilterArgs),
    /// Kill jobs matching a filter expression.
    Kill(MandatoryFilterArgs),
    /// Re-submit terminal jobs matching a filter expression.
    Rerun(MandatoryFilterArgs),
}

#[derive(Args)]
pub struct ServerArgs {
    /// Address to bind both listeners on.
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Port clients connect to.
    #[arg(short = 'p', long, default_value_t = 7760)]
    pub client_port: u16,

    /// Port workers connect to.
    #[arg(short = 'w', long, default_value_t = 7761)]
    pub worker_port: u16,

    /// Number of in-process local workers to spawn alongside the server.
    #[arg(short = 'N', long, default_value_t = 0)]
    pub workers: usize,

    #[arg(long)]
    pub config_file: Option<String>,

    #[arg(long, default_value = "info")]
    pub log_filter: String,
}

#[derive(Args)]
pub struct WorkerArgs {
    /// Host the server's worker port is listening on.
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short = 'p', long, default_value_t = 7761)]
    pub port: u16,

    /// Number of jobs this worker runs concurrently. Must be at least 1.
    #[arg(short = 'N', long, default_value_t = 1)]
    pub slots: usize,

    /// Auto-reconnect after a transient connection failure, retrying every
    /// SECONDS (default 10 when the flag is given without a value). Absent
    /// entirely, the worker still retries forever with exponential backoff;
    /// this flag instead pins the steady-state retry interval.
    #[arg(short = 'r', long, num_args = 0..=1, default_missing_value = "10")]
    pub reconnect: Option<u64>,

    #[arg(long)]
    pub config_file: Option<String>,

    #[arg(long, default_value = "info")]
    pub log_filter: String,
}

#[derive(Args)]
pub struct EnqueueArgs {
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short = 'p', long, default_value_t = 7760)]
    pub port: u16,

    /// Human-readable name for the job.
    #[arg(short = 'n', long, default_value = "unnamed-job")]
    pub name: String,

    #[arg(short = 'd', long, default_value = ".")]
    pub directory: String,

    #[arg(short = 'P', long, default_value_t = 0)]
    pub priority: i64,

    /// Write stdout/stderr to these two files instead of discarding them.
    #[arg(short = 'o', long, requires = "stderr_file")]
    pub stdout_file: Option<String>,

    #[arg(short = 'e', long, requires = "stdout_file")]
    pub stderr_file: Option<String>,

    /// Stream output to this terminal and exit with the child's exit code.
    #[arg(short = 'w', long, conflicts_with_all = ["stdout_file", "stderr_file"])]
    pub watch: bool,

    /// The command and its arguments.
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Args)]
pub struct FilterArgs {
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short = 'p', long, default_value_t = 7760)]
    pub port: u16,

    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Job-match expression; absent means "all jobs".
    pub filter: Option<String>,
}

#[derive(Args)]
pub struct MandatoryFilterArgs {
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short = 'p', long, default_value_t = 7760)]
    pub port: u16,

    pub filter: String,
}
