//! Handles one worker connection. A worker repeatedly asks `RequestJob` and
//! blocks (on the server side, inside `JobQueue::take_queued`) until one is
//! available; in between it reports exit statuses and streams output chunks
//! for whichever jobs it's currently running.
//!
//! Every request carries a `CorrelationId` that its reply echoes back, since
//! replies aren't the only thing written to this connection: a `KillJob` can
//! arrive unprompted, the moment a client kills a job this worker happens to
//! be running. Pushes use the reserved [`tpar_net::PUSH_CORRELATION_ID`]
//! rather than replying to anything in particular.

use crate::state::ServerState;
use futures::{SinkExt, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;
use tpar_base::{JobDescriptor, JobId, WorkerRequest, WorkerResponse};
use tpar_net::{split_framed, Envelope, PUSH_CORRELATION_ID};
use tracing::{debug, info, warn};

type InEnvelope = Envelope<WorkerRequest>;
type OutEnvelope = Envelope<WorkerResponse>;

pub async fn run(state: Arc<ServerState>, stream: tokio::net::TcpStream, peer: std::net::SocketAddr) {
    let worker_id = state.fresh_worker_id();
    info!(%peer, %worker_id, "worker connected");
    let (mut reader, writer) = split_framed::<InEnvelope, OutEnvelope>(stream);

    let (out_tx, out_rx) = mpsc::unbounded_channel::<OutEnvelope>();
    let writer_task = tokio::spawn(drain_to_socket(writer, out_rx));

    // Jobs this connection has been dispatched and hasn't yet reported an
    // exit/spawn-failure for. If the connection drops with jobs still in
    // here, whatever's running on the other end died with it.
    let mut owned_jobs: HashSet<JobId> = HashSet::new();

    loop {
        let envelope = match reader.next().await {
            Some(Ok(envelope)) => envelope,
            Some(Err(err)) => {
                warn!(%peer, %worker_id, %err, "worker connection framing error");
                break;
            }
            None => {
                debug!(%peer, %worker_id, "worker disconnected");
                break;
            }
        };
        let correlation_id = envelope.correlation_id;

        let reply = match envelope.body {
            WorkerRequest::RequestJob => {
                let (id, job_request, sink, cancel) = state.queue.take_queued(worker_id).await;
                owned_jobs.insert(id);
                let out_tx_for_watcher = out_tx.clone();
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    let _ = out_tx_for_watcher.send(Envelope {
                        correlation_id: PUSH_CORRELATION_ID,
                        body: WorkerResponse::KillJob(id),
                    });
                });
                WorkerResponse::Job(JobDescriptor {
                    id,
                    request: job_request,
                    sink,
                })
            }
            WorkerRequest::ReportExit(id, exit_status) => {
                owned_jobs.remove(&id);
                state.queue.set_finished(id, exit_status).await;
                WorkerResponse::Ack
            }
            WorkerRequest::ReportSpawnFailure(id, error_msg) => {
                owned_jobs.remove(&id);
                state.queue.set_failed(id, error_msg).await;
                WorkerResponse::Ack
            }
            WorkerRequest::PushOutput(stream_id, chunk) => {
                state.push_output(stream_id, chunk).await;
                WorkerResponse::Ack
            }
            WorkerRequest::PushDone(stream_id, exit_status) => {
                state.finish_stream_done(stream_id, exit_status).await;
                WorkerResponse::Ack
            }
            WorkerRequest::PushFailed(stream_id, message) => {
                state.finish_stream_failed(stream_id, message).await;
                WorkerResponse::Ack
            }
        };

        if out_tx
            .send(Envelope {
                correlation_id,
                body: reply,
            })
            .is_err()
        {
            break;
        }
    }

    // Whatever this worker was still running died with the connection: no
    // `ReportExit` is ever coming for these, so fail them here rather than
    // leaving them stuck in `Running` forever.
    for id in owned_jobs {
        state
            .queue
            .set_failed(id, "worker disconnected".to_string())
            .await;
    }

    drop(out_tx);
    writer_task.abort();
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

#[cfg(test)]
mod tests {
    use super::*;
    use tpar_base::{JobRequest, SinkKind};
    use tpar_net::Envelope as NetEnvelope;

    /// A worker that requests a job, gets one, and then vanishes without
    /// ever reporting an exit — e.g. the process crashed or the network
    /// partitioned. The job it was running must end up `Failed`, not stuck
    /// in `Running` forever.
    #[tokio::test]
    async fn a_job_owned_by_a_worker_that_disconnects_is_failed() {
        let state = Arc::new(ServerState::new());
        let id = state
            .queue
            .enqueue(JobRequest::new("true"), SinkKind::NoOutput)
            .await;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server_state = state.clone();
        let server_task = tokio::spawn(async move {
            let (stream, peer) = listener.accept().await.unwrap();
            run(server_state, stream, peer).await;
        });

        let worker_stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (mut worker_reader, mut worker_writer) =
            split_framed::<OutEnvelope, InEnvelope>(worker_stream);

        worker_writer
            .send(NetEnvelope {
                correlation_id: tpar_net::CorrelationId(0),
                body: WorkerRequest::RequestJob,
            })
            .await
            .unwrap();
        let reply = worker_reader.next().await.unwrap().unwrap();
        match reply.body {
            WorkerResponse::Job(job) => assert_eq!(job.id, id),
            other => panic!("expected Job, got {other:?}"),
        }

        // The worker disappears mid-job: drop both halves instead of
        // reporting an exit.
        drop(worker_reader);
        drop(worker_writer);

        server_task.await.unwrap();

        let job = state.queue.get(id).await.unwrap();
        assert!(job.state.is_terminal());
        assert_eq!(job.state.to_view().kind(), tpar_base::JobStateKind::Failed);
    }
}
