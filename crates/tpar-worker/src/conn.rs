//! A persistent, multiplexed connection to the server's worker port. Wraps
//! `tpar-net`'s correlation-id RPC primitive so that `call` can be invoked
//! from many concurrently-running jobs at once while a single background
//! task owns the actual socket, and so that an unsolicited `KillJob` push
//! can be demultiplexed to the one job it's about to kill.

use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tpar_base::{JobId, WorkerRequest, WorkerResponse};
use tpar_net::{split_framed, CallError, Envelope, PendingCalls, PUSH_CORRELATION_ID};
use tracing::warn;

type InEnvelope = Envelope<WorkerResponse>;
type OutEnvelope = Envelope<WorkerRequest>;

pub struct WorkerConn {
    out_tx: mpsc::UnboundedSender<OutEnvelope>,
    pending: Arc<PendingCalls<WorkerResponse>>,
    kills: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
}

impl WorkerConn {
    /// Takes ownership of an already-connected socket and spawns the reader
    /// and writer tasks that keep it alive until either side closes it or a
    /// framing error occurs.
    pub fn new(stream: TcpStream) -> Self {
        let (mut reader, writer) = split_framed::<InEnvelope, OutEnvelope>(stream);
        let (out_tx, out_rx) = mpsc::unbounded_channel::<OutEnvelope>();
        let pending = PendingCalls::new();
        let kills: Arc<Mutex<HashMap<JobId, CancellationToken>>> =
            Arc::new(Mutex::new(HashMap::new()));

        tokio::spawn(drain_to_socket(writer, out_rx));

        let pending_for_reader = pending.clone();
        let kills_for_reader = kills.clone();
        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(envelope) => {
                        route_incoming(envelope, &pending_for_reader, &kills_for_reader).await
                    }
                    Err(err) => {
                        warn!(%err, "worker connection framing error, closing");
                        break;
                    }
                }
            }
            pending_for_reader.fail_all().await;
        });

        WorkerConn {
            out_tx,
            pending,
            kills,
        }
    }

    pub async fn call(&self, request: WorkerRequest) -> Result<WorkerResponse, CallError> {
        let (correlation_id, rx) = self.pending.register().await;
        self.out_tx
            .send(Envelope {
                correlation_id,
                body: request,
            })
            .map_err(|_| CallError::Disconnected)?;
        rx.await.map_err(|_| CallError::Disconnected)
    }

    /// Registers `token` as the one to cancel if the server pushes a
    /// `KillJob` for `id`. Must be called before the job's first
    /// `RequestJob`-triggered work so an immediate kill can't race ahead of
    /// the registration.
    pub async fn watch_for_kill(&self, id: JobId, token: CancellationToken) {
        self.kills.lock().await.insert(id, token);
    }

    pub async fn stop_watching(&self, id: JobId) {
        self.kills.lock().await.remove(&id);
    }
}

async fn route_incoming(
    envelope: InEnvelope,
    pending: &PendingCalls<WorkerResponse>,
    kills: &Mutex<HashMap<JobId, CancellationToken>>,
) {
    if envelope.correlation_id == PUSH_CORRELATION_ID {
        if let WorkerResponse::KillJob(id) = envelope.body {
            if let Some(token) = kills.lock().await.get(&id) {
                token.cancel();
            }
        }
        return;
    }
    pending.resolve(envelope.correlation_id, envelope.body).await;
}

async fn drain_to_socket(
    mut writer: tpar_net::FrameWriter<OutEnvelope>,
    mut out_rx: mpsc::UnboundedReceiver<OutEnvelope>,
) {
    while let Some(envelope) = out_rx.recv().await {
        if writer.send(envelope).await.is_err() {
            return;
        }
    }
}
