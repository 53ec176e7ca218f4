//! The tpar server: accepts client and worker connections, holds the job
//! queue and output-stream registry, and dispatches every request against
//! them (spec.md §4.E).

pub mod client_conn;
pub mod config;
pub mod dispatch;
pub mod state;
pub mod worker_conn;

pub use config::ServerConfig;
pub use state::ServerState;

use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Runs the server until a fatal listener error occurs. Spawns one task per
/// accepted connection and dispatches it to either `client_conn::run` or
/// `worker_conn::run` based on which port it came in on: workers and
/// clients use separate ports rather than a handshake message, so a
/// misconfigured worker can never silently masquerade as a client.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let state = Arc::new(ServerState::new());

    let client_listener = TcpListener::bind((config.host.as_str(), config.client_port)).await?;
    let worker_listener = TcpListener::bind((config.host.as_str(), config.worker_port)).await?;
    info!(
        host = %config.host,
        client_port = config.client_port,
        worker_port = config.worker_port,
        "tpar server listening"
    );

    loop {
        tokio::select! {
            accepted = client_listener.accept() => {
                let (stream, peer) = accepted?;
                let state = state.clone();
                tokio::spawn(async move { client_conn::run(state, stream, peer).await });
            }
            accepted = worker_listener.accept() => {
                match accepted {
                    Ok((stream, peer)) => {
                        let state = state.clone();
                        tokio::spawn(async move { worker_conn::run(state, stream, peer).await });
                    }
                    Err(err) => error!(%err, "failed to accept worker connection"),
                }
            }
        }
    }
}
