//! Pure(ish) handlers for each `ClientRequest`/`WorkerRequest` variant,
//! kept separate from the connection-handling loops so each one reads as a
//! single self-contained transition over [`ServerState`] — the same split
//! the upstream scheduler draws between its `receive_message` dispatch and
//! the per-message `receive_*` handlers it calls out to.

use crate::state::ServerState;
use tpar_base::{
    ClientResponse, EnqueueResponse, JobMatch, JobSnapshot, JobStateKind, SinkKind, SinkRequest,
};
use tracing::info;

/// Everything a client can ask for except `Subscribe`, which the connection
/// handler deals with directly: it needs the live event stream `handle_*`
/// here has no way to hand back through a plain `ClientResponse`.
pub enum NonStreamingRequest {
    Enqueue(tpar_base::EnqueueRequest),
    Status(JobMatch),
    Kill(JobMatch),
    Rerun(JobMatch),
}

pub async fn handle_client_request(
    state: &ServerState,
    request: NonStreamingRequest,
) -> ClientResponse {
    match request {
        NonStreamingRequest::Enqueue(req) => {
            let sink = resolve_sink(state, req.sink).await;
            let id = state.queue.enqueue(req.request, sink.clone()).await;
            info!(job_id = %id, "enqueued job");
            ClientResponse::Enqueued(EnqueueResponse { id, sink })
        }
        NonStreamingRequest::Status(filter) => {
            ClientResponse::Jobs(matching_snapshots(state, &filter).await)
        }
        NonStreamingRequest::Kill(filter) => {
            let snapshots = matching_snapshots(state, &filter).await;
            for snapshot in &snapshots {
                state.queue.kill(snapshot.id).await;
            }
            // Post-kill snapshot, narrowed to jobs actually in `Killed` now:
            // a filter that also matches an already-terminal job (e.g.
            // `state:finished or id:3`) must not report that job as killed
            // just because it matched.
            let killed = matching_snapshots(state, &filter)
                .await
                .into_iter()
                .filter(|snapshot| snapshot.state.kind() == JobStateKind::Killed)
                .collect();
            ClientResponse::Jobs(killed)
        }
        NonStreamingRequest::Rerun(filter) => {
            let snapshots = matching_snapshots(state, &filter).await;
            let mut reran = Vec::with_capacity(snapshots.len());
            for snapshot in snapshots {
                if !snapshot.state.is_terminal() {
                    continue;
                }
                // Reruns always start with no output capture, regardless of
                // the original job's sink: a `ToRemoteSink` stream id from a
                // finished job has no subscriber left to reuse it, and
                // silently reallocating a new one would surprise a caller
                // that has no way to learn the new id from a bare rerun.
                let id = state
                    .queue
                    .enqueue(snapshot.request.clone(), SinkKind::NoOutput)
                    .await;
                if let Some(job) = state.queue.get(id).await {
                    reran.push(job.to_snapshot());
                }
            }
            ClientResponse::Jobs(reran)
        }
    }
}

async fn resolve_sink(state: &ServerState, requested: SinkRequest) -> SinkKind {
    match requested {
        SinkRequest::NoOutput => SinkKind::NoOutput,
        SinkRequest::ToFiles(stdout, stderr) => SinkKind::ToFiles(stdout, stderr),
        SinkRequest::Watch => SinkKind::ToRemoteSink(state.open_stream().await),
    }
}

async fn matching_snapshots(state: &ServerState, filter: &JobMatch) -> Vec<JobSnapshot> {
    state
        .queue
        .all()
        .await
        .iter()
        .map(|job| job.to_snapshot())
        .filter(|snapshot| filter.matches(snapshot))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpar_base::{ExitStatus, JobRequest, WorkerId};

    fn request(name: &str) -> tpar_base::JobRequest {
        let mut req = JobRequest::new("true");
        req.name = name.to_string();
        req
    }

    async fn enqueue(state: &ServerState, name: &str) -> tpar_base::JobId {
        state.queue.enqueue(request(name), SinkKind::NoOutput).await
    }

    #[tokio::test]
    async fn kill_only_reports_jobs_it_actually_killed() {
        let state = ServerState::new();
        let finished = enqueue(&state, "already-done").await;
        state.queue.take_queued(WorkerId(0)).await;
        state.queue.set_finished(finished, ExitStatus::Exited(0)).await;

        let queued = enqueue(&state, "still-queued").await;

        let filter: JobMatch = "all".parse().unwrap();
        let response =
            handle_client_request(&state, NonStreamingRequest::Kill(filter)).await;
        let jobs = match response {
            ClientResponse::Jobs(jobs) => jobs,
            other => panic!("expected Jobs, got {other:?}"),
        };

        // `finished` matched the filter but was already terminal, so it
        // must not show up as something this kill call killed.
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, queued);
        assert_eq!(jobs[0].state.kind(), JobStateKind::Killed);
    }

    #[tokio::test]
    async fn rerun_skips_non_terminal_jobs() {
        let state = ServerState::new();
        let running = enqueue(&state, "still-running").await;
        state.queue.take_queued(WorkerId(0)).await;
        let queued = enqueue(&state, "still-queued").await;

        let filter: JobMatch = "all".parse().unwrap();
        let response =
            handle_client_request(&state, NonStreamingRequest::Rerun(filter)).await;
        let reran = match response {
            ClientResponse::Jobs(jobs) => jobs,
            other => panic!("expected Jobs, got {other:?}"),
        };

        assert!(reran.is_empty());
        // Neither original job was touched: still exactly one Running and
        // one Queued job, no new ones created.
        let all = state.queue.all().await;
        assert_eq!(all.len(), 2);
        assert!(all.iter().any(|j| j.id == running));
        assert!(all.iter().any(|j| j.id == queued));
    }

    #[tokio::test]
    async fn rerun_resubmits_each_terminal_job_as_a_fresh_queued_job() {
        let state = ServerState::new();
        let original = enqueue(&state, "exits-with-2").await;
        state.queue.take_queued(WorkerId(0)).await;
        state
            .queue
            .set_finished(original, ExitStatus::Exited(2))
            .await;

        let filter: JobMatch = format!("id:{}", original.0).parse().unwrap();
        let response =
            handle_client_request(&state, NonStreamingRequest::Rerun(filter)).await;
        let reran = match response {
            ClientResponse::Jobs(jobs) => jobs,
            other => panic!("expected Jobs, got {other:?}"),
        };

        assert_eq!(reran.len(), 1);
        assert_ne!(reran[0].id, original);
        assert_eq!(reran[0].state.kind(), JobStateKind::Queued);
        assert_eq!(reran[0].request.command, "true");

        // The original job is untouched by the rerun.
        let original_job = state.queue.get(original).await.unwrap();
        assert_eq!(original_job.state.to_view().kind(), JobStateKind::Finished);
    }
}
