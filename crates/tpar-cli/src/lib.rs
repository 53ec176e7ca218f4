//! The `tpar` CLI: the external boundary tying server, worker, and client
//! operations into one runnable program (spec.md §6).

pub mod cli;
pub mod client;
pub mod print;

use anyhow::Result;
use std::process::ExitCode;
use tokio::io::{self, AsyncWrite, AsyncWriteExt};
use tpar_base::{
    ClientRequest, ClientResponse, EnqueueRequest, JobMatch, JobRequest, Priority, SinkRequest,
    StreamEvent,
};
use tracing_subscriber::EnvFilter;

pub use cli::{Cli, Command, EnqueueArgs, FilterArgs, MandatoryFilterArgs, ServerArgs, WorkerArgs};

pub async fn dispatch(command: Command) -> Result<ExitCode> {
    match command {
        Command::Server(args) => run_server(args).await.map(|()| ExitCode::SUCCESS),
        Command::Worker(args) => run_worker(args).await.map(|()| ExitCode::SUCCESS),
        Command::Enqueue(args) => run_enqueue(args).await,
        Command::Status(args) => run_status(args).await,
        Command::Kill(args) => run_filter_command(args, ClientRequest::Kill).await,
        Command::Rerun(args) => run_filter_command(args, ClientRequest::Rerun).await,
    }
}

fn init_tracing(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .try_init();
}

async fn run_server(args: ServerArgs) -> Result<()> {
    init_tracing(&args.log_filter);
    let config = tpar_server::ServerConfig {
        host: args.host.clone(),
        client_port: args.client_port,
        worker_port: args.worker_port,
        log_filter: args.log_filter,
    };

    for _ in 0..args.workers {
        let worker_config = tpar_worker::WorkerConfig {
            server_host: args.host.clone(),
            server_port: args.worker_port,
            slots: 1,
            reconnect_interval_secs: None,
            log_filter: "off".to_string(),
        };
        tokio::spawn(tpar_worker::run(worker_config));
    }

    tpar_server::run(config).await
}

async fn run_worker(args: WorkerArgs) -> Result<()> {
    init_tracing(&args.log_filter);
    let config = tpar_worker::WorkerConfig {
        server_host: args.host,
        server_port: args.port,
        slots: args.slots.max(1),
        reconnect_interval_secs: args.reconnect,
        log_filter: args.log_filter,
    };
    tpar_worker::run(config).await
}

async fn run_enqueue(args: EnqueueArgs) -> Result<ExitCode> {
    let mut conn = client::ServerConn::connect(&args.host, args.port).await?;

    let (command, arguments) = args
        .command
        .split_first()
        .map(|(cmd, rest)| (cmd.clone(), rest.to_vec()))
        .expect("clap enforces at least one positional argument");

    let sink = if args.watch {
        SinkRequest::Watch
    } else if let (Some(stdout), Some(stderr)) = (&args.stdout_file, &args.stderr_file) {
        SinkRequest::ToFiles(stdout.clone(), stderr.clone())
    } else {
        SinkRequest::NoOutput
    };

    let request = JobRequest {
        name: args.name,
        priority: Priority(args.priority as i32),
        command,
        arguments,
        working_directory: args.directory,
        environment: None,
    };

    let response = conn
        .call(ClientRequest::Enqueue(EnqueueRequest { request, sink }))
        .await?;
    let enqueued = match response {
        ClientResponse::Enqueued(enqueued) => enqueued,
        other => anyhow::bail!("expected Enqueued, got {other:?}"),
    };
    println!("job {}", enqueued.id);

    if !args.watch {
        return Ok(ExitCode::SUCCESS);
    }

    let stream_id = match enqueued.sink {
        tpar_base::SinkKind::ToRemoteSink(id) => id,
        other => anyhow::bail!("expected a remote sink for a watched job, got {other:?}"),
    };
    let response = conn.call(ClientRequest::Subscribe(stream_id)).await?;
    match response {
        ClientResponse::SubscribeAck => {}
        ClientResponse::SubscribeAlreadyTerminated => {}
        other => anyhow::bail!("expected SubscribeAck, got {other:?}"),
    }

    let mut stdout = io::stdout();
    let mut stderr = io::stderr();
    loop {
        match conn.next_stream_event().await? {
            StreamEvent::Chunk(chunk) => {
                let sink: &mut (dyn AsyncWrite + Unpin) = match chunk.stream {
                    tpar_base::StdStream::Stdout => &mut stdout,
                    tpar_base::StdStream::Stderr => &mut stderr,
                };
                sink.write_all(&chunk.data).await?;
                sink.flush().await?;
            }
            StreamEvent::Done(status) => return Ok(exit_code_for(&status)),
            StreamEvent::Failed(reason) => {
                eprintln!("job {}: {reason}", enqueued.id);
                return Ok(ExitCode::FAILURE);
            }
        }
    }
}

fn exit_code_for(status: &tpar_base::ExitStatus) -> ExitCode {
    match status {
        tpar_base::ExitStatus::Exited(code) => ExitCode::from(*code as u8),
        tpar_base::ExitStatus::Signaled(_) => ExitCode::FAILURE,
    }
}

async fn run_status(args: FilterArgs) -> Result<ExitCode> {
    let mut conn = client::ServerConn::connect(&args.host, args.port).await?;
    let filter = parse_filter(args.filter.as_deref())?;
    let response = conn.call(ClientRequest::Status(filter)).await?;
    let jobs = match response {
        ClientResponse::Jobs(jobs) => jobs,
        other => anyhow::bail!("expected Jobs, got {other:?}"),
    };
    print::print_jobs(&jobs, args.verbose);
    Ok(ExitCode::SUCCESS)
}

async fn run_filter_command(
    args: MandatoryFilterArgs,
    to_request: impl FnOnce(JobMatch) -> ClientRequest,
) -> Result<ExitCode> {
    let mut conn = client::ServerConn::connect(&args.host, args.port).await?;
    let filter = parse_filter(Some(&args.filter))?;
    let response = conn.call(to_request(filter)).await?;
    let jobs = match response {
        ClientResponse::Jobs(jobs) => jobs,
        other => anyhow::bail!("expected Jobs, got {other:?}"),
    };
    print::print_jobs(&jobs, false);
    if jobs.is_empty() {
        Ok(ExitCode::FAILURE)
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

fn parse_filter(raw: Option<&str>) -> Result<JobMatch> {
    match raw {
        None => Ok(JobMatch::All),
        Some(text) => text
            .parse()
            .map_err(|err| anyhow::anyhow!("invalid filter expression: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_filter_means_all() {
        assert_eq!(parse_filter(None).unwrap(), JobMatch::All);
    }

    #[test]
    fn filter_text_is_parsed_through_job_match() {
        assert_eq!(
            parse_filter(Some("state:running")).unwrap(),
            JobMatch::State(tpar_base::JobStateKind::Running)
        );
    }

    #[test]
    fn bad_filter_text_is_an_error() {
        assert!(parse_filter(Some("(unterminated")).is_err());
    }

    #[test]
    fn a_successful_exit_does_not_panic() {
        let _ = exit_code_for(&tpar_base::ExitStatus::Exited(0));
    }

    #[test]
    fn a_signal_death_does_not_panic() {
        let _ = exit_code_for(&tpar_base::ExitStatus::Signaled(9));
    }
}
