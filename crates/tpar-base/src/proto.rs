//! The message shapes exchanged over a framed connection (spec.md §4.A/§6).
//!
//! A client connection carries `ClientRequest`/`ClientResponse` pairs plus,
//! for a watched job, a side-channel of `StreamEvent`s. A worker connection
//! carries `WorkerRequest`/`WorkerResponse` pairs.

use crate::filter::JobMatch;
use crate::ids::{JobId, StreamId, WorkerId};
use crate::request::{ExitStatus, JobRequest, OutputChunk};
use serde::{Deserialize, Serialize};

/// What a client asked the server to do with a job's output, before the
/// server has resolved it into a concrete `SinkKind` (allocating files or a
/// stream id as needed).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum SinkRequest {
    NoOutput,
    ToFiles(String, String),
    Watch,
}

/// The server's resolved view of where a job's output goes. Carried in both
/// `JobDescriptor` (to the worker) and `JobSnapshot` (to clients inspecting
/// queue state).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum SinkKind {
    NoOutput,
    ToFiles(String, String),
    ToRemoteSink(StreamId),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct EnqueueRequest {
    pub request: JobRequest,
    pub sink: SinkRequest,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct EnqueueResponse {
    pub id: JobId,
    pub sink: SinkKind,
}

/// A point-in-time view of a job's lifecycle state (spec.md §3 `JobState`),
/// flattened for the wire.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum JobStateView {
    Queued { queue_time: u64 },
    Running { worker_id: WorkerId, start_time: u64 },
    Finished { exit_status: ExitStatus, finish_time: u64 },
    Failed { error_msg: String, failed_time: u64 },
    Killed { killed_time: u64 },
}

impl JobStateView {
    pub fn kind(&self) -> JobStateKind {
        match self {
            JobStateView::Queued { .. } => JobStateKind::Queued,
            JobStateView::Running { .. } => JobStateKind::Running,
            JobStateView::Finished { .. } => JobStateKind::Finished,
            JobStateView::Failed { .. } => JobStateKind::Failed,
            JobStateView::Killed { .. } => JobStateKind::Killed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind(),
            JobStateKind::Finished | JobStateKind::Failed | JobStateKind::Killed
        )
    }
}

#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum JobStateKind {
    Queued,
    Running,
    Finished,
    Failed,
    Killed,
}

/// A full snapshot of one job, as returned by `status`/`kill`/`rerun`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub request: JobRequest,
    pub sink: SinkKind,
    pub state: JobStateView,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum ClientRequest {
    Enqueue(EnqueueRequest),
    Status(JobMatch),
    Kill(JobMatch),
    Rerun(JobMatch),
    Subscribe(StreamId),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum ClientResponse {
    Enqueued(EnqueueResponse),
    Jobs(Vec<JobSnapshot>),
    SubscribeAck,
    SubscribeAlreadyTerminated,
    /// A `StreamEvent` delivered on the same connection, after `SubscribeAck`,
    /// for the stream that connection just subscribed to.
    StreamMessage(StreamEvent),
    Error(String),
}

/// Sent on the side-channel opened by a successful `Subscribe`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum StreamEvent {
    Chunk(OutputChunk),
    Done(ExitStatus),
    Failed(String),
}

/// A job handed to a worker, with its output sink already resolved.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct JobDescriptor {
    pub id: JobId,
    pub request: JobRequest,
    pub sink: SinkKind,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum WorkerRequest {
    RequestJob,
    ReportExit(JobId, ExitStatus),
    ReportSpawnFailure(JobId, String),
    PushOutput(StreamId, OutputChunk),
    PushDone(StreamId, ExitStatus),
    PushFailed(StreamId, String),
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum WorkerResponse {
    Job(JobDescriptor),
    Ack,
    /// Pushed to the worker unsolicited, whenever a client kills a job that
    /// worker happens to be running. Not a reply to any particular
    /// `WorkerRequest`.
    KillJob(JobId),
}
