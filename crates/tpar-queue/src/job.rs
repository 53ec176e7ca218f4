use tokio_util::sync::CancellationToken;
use tpar_base::{now_millis, ExitStatus, JobId, JobRequest, JobStateView, SinkKind, WorkerId};

/// The server's in-memory view of a job's lifecycle (spec.md §3). Unlike
/// [`JobStateView`], `Running` carries a live [`CancellationToken`] rather
/// than nothing: that's the handle a `kill` uses to signal the task
/// supervising the child process, and it can't cross the wire, which is why
/// the wire-facing [`JobStateView`] exists as a separate, strictly smaller
/// type.
#[derive(Clone, Debug)]
pub enum JobState {
    Queued {
        queue_time: u64,
    },
    Running {
        worker_id: WorkerId,
        start_time: u64,
        cancel: CancellationToken,
    },
    Finished {
        exit_status: ExitStatus,
        finish_time: u64,
    },
    Failed {
        error_msg: String,
        failed_time: u64,
    },
    Killed {
        killed_time: u64,
    },
}

impl JobState {
    pub fn queued_now() -> Self {
        JobState::Queued {
            queue_time: now_millis(),
        }
    }

    pub fn running_now(worker_id: WorkerId) -> Self {
        JobState::Running {
            worker_id,
            start_time: now_millis(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Finished { .. } | JobState::Failed { .. } | JobState::Killed { .. }
        )
    }

    pub fn to_view(&self) -> JobStateView {
        match self {
            JobState::Queued { queue_time } => JobStateView::Queued {
                queue_time: *queue_time,
            },
            JobState::Running {
                worker_id,
                start_time,
                ..
            } => JobStateView::Running {
                worker_id: *worker_id,
                start_time: *start_time,
            },
            JobState::Finished {
                exit_status,
                finish_time,
            } => JobStateView::Finished {
                exit_status: exit_status.clone(),
                finish_time: *finish_time,
            },
            JobState::Failed {
                error_msg,
                failed_time,
            } => JobStateView::Failed {
                error_msg: error_msg.clone(),
                failed_time: *failed_time,
            },
            JobState::Killed { killed_time } => JobStateView::Killed {
                killed_time: *killed_time,
            },
        }
    }
}

/// A job as the server tracks it: its immutable submission plus its current
/// lifecycle state.
#[derive(Clone, Debug)]
pub struct Job {
    pub id: JobId,
    pub request: JobRequest,
    pub sink: SinkKind,
    pub state: JobState,
}

impl Job {
    pub fn to_snapshot(&self) -> tpar_base::JobSnapshot {
        tpar_base::JobSnapshot {
            id: self.id,
            request: self.request.clone(),
            sink: self.sink.clone(),
            state: self.state.to_view(),
        }
    }
}
