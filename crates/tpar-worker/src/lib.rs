//! The tpar worker: connects to a server, pulls jobs up to its configured
//! number of slots, and runs each one to completion (spec.md §4.F).

pub mod config;
pub mod conn;
pub mod executor;

pub use config::WorkerConfig;

use conn::WorkerConn;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tpar_base::{WorkerRequest, WorkerResponse};
use tracing::{error, info, warn};

const INITIAL_BACKOFF: Duration = Duration::from_millis(200);
const MAX_BACKOFF: Duration = Duration::from_secs(10);

pub async fn run(config: WorkerConfig) -> anyhow::Result<()> {
    let semaphore = Arc::new(Semaphore::new(config.slots));
    let max_backoff = config
        .reconnect_interval_secs
        .map(Duration::from_secs)
        .unwrap_or(MAX_BACKOFF);
    let mut backoff = INITIAL_BACKOFF.min(max_backoff);

    loop {
        match connect(&config).await {
            Ok(conn) => {
                backoff = INITIAL_BACKOFF.min(max_backoff);
                info!(host = %config.server_host, port = config.server_port, "connected to server");
                serve(conn, semaphore.clone()).await;
                warn!("connection to server lost, reconnecting");
            }
            Err(err) => {
                warn!(%err, backoff_ms = backoff.as_millis() as u64, "failed to connect to server");
            }
        }
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(max_backoff);
    }
}

async fn connect(config: &WorkerConfig) -> anyhow::Result<Arc<WorkerConn>> {
    let stream = TcpStream::connect((config.server_host.as_str(), config.server_port)).await?;
    Ok(Arc::new(WorkerConn::new(stream)))
}

/// Pulls and runs jobs on this connection until it breaks. Each accepted
/// job occupies one semaphore permit for its lifetime, so this worker never
/// has more than `slots` jobs running concurrently; `RequestJob` itself
/// already blocks server-side until work exists, so there's no need to poll.
async fn serve(conn: Arc<WorkerConn>, semaphore: Arc<Semaphore>) {
    loop {
        let permit = match semaphore.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let response = conn.call(WorkerRequest::RequestJob).await;
        match response {
            Ok(WorkerResponse::Job(descriptor)) => {
                let conn = conn.clone();
                tokio::spawn(async move {
                    executor::run_job(descriptor, conn).await;
                    drop(permit);
                });
            }
            Ok(other) => {
                error!(?other, "unexpected reply to RequestJob");
                drop(permit);
            }
            Err(_) => {
                drop(permit);
                return;
            }
        }
    }
}
