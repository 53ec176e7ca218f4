//! The priority job queue (spec.md §4.D). A single `JobQueue` is shared by
//! every connection handler in the server; all of its operations take the
//! same internal lock, so each one is atomic with respect to every other —
//! there's no way to observe a job half-transitioned between states, and no
//! way for a `kill` and a job's own natural completion to interleave into a
//! state that's neither one nor the other (spec.md §9, "kill vs finish
//! race").

use crate::job::{Job, JobState};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tpar_base::{JobId, JobRequest, Priority, SinkKind, WorkerId};

struct Inner {
    next_id: u64,
    jobs: HashMap<JobId, Job>,
    /// Ready-to-run job ids, smallest `Priority` popped first and ties
    /// broken by the smaller `JobId` (earlier submission wins). A heap entry
    /// can go stale if the job it names is killed or taken while still
    /// sitting in the heap under an older state; `pop_ready` skips those.
    heap: BinaryHeap<Reverse<(Priority, JobId)>>,
}

/// A priority-ordered, thread-safe queue of jobs. Backed by a
/// [`tokio::sync::Mutex`] plus a [`tokio::sync::Notify`] rather than a
/// condition variable: `take_queued` registers interest in being woken
/// before it checks the queue, so a job enqueued between the check and the
/// wait is never missed.
pub struct JobQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for JobQueue {
    fn default() -> Self {
        JobQueue {
            inner: Mutex::new(Inner {
                next_id: 0,
                jobs: HashMap::new(),
                heap: BinaryHeap::new(),
            }),
            notify: Notify::new(),
        }
    }
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates an id, records the job as `Queued`, and wakes one waiter in
    /// `take_queued` (if any). Returns the new job's id.
    pub async fn enqueue(&self, request: JobRequest, sink: SinkKind) -> JobId {
        let mut inner = self.inner.lock().await;
        let id = JobId(inner.next_id);
        inner.next_id += 1;
        let priority = request.priority;
        inner.jobs.insert(
            id,
            Job {
                id,
                request,
                sink,
                state: JobState::queued_now(),
            },
        );
        inner.heap.push(Reverse((priority, id)));
        drop(inner);
        self.notify.notify_one();
        id
    }

    /// Blocks until a queued job is available, then atomically transitions
    /// it to `Running` under `worker_id` and returns it, along with the
    /// `CancellationToken` that a later `kill` of this job will trigger.
    /// Never busy-waits: between polls it parks on `notify`.
    pub async fn take_queued(
        &self,
        worker_id: WorkerId,
    ) -> (JobId, JobRequest, SinkKind, CancellationToken) {
        loop {
            let notified = self.notify.notified();
            {
                let mut inner = self.inner.lock().await;
                if let Some(ready) = pop_ready(&mut inner, worker_id) {
                    return ready;
                }
            }
            notified.await;
        }
    }

    pub async fn get(&self, id: JobId) -> Option<Job> {
        self.inner.lock().await.jobs.get(&id).cloned()
    }

    pub async fn all(&self) -> Vec<Job> {
        self.inner.lock().await.jobs.values().cloned().collect()
    }

    /// Marks a job `Finished`. A no-op if the job isn't currently `Running`
    /// (e.g. it was killed concurrently and a stale worker report arrives
    /// after the fact).
    pub async fn set_finished(&self, id: JobId, exit_status: tpar_base::ExitStatus) {
        let mut inner = self.inner.lock().await;
        if let Some(job) = inner.jobs.get_mut(&id) {
            if matches!(job.state, JobState::Running { .. }) {
                job.state = JobState::Finished {
                    exit_status,
                    finish_time: tpar_base::now_millis(),
                };
            }
        }
    }

    pub async fn set_failed(&self, id: JobId, error_msg: String) {
        let mut inner = self.inner.lock().await;
        if let Some(job) = inner.jobs.get_mut(&id) {
            if !job.state.is_terminal() {
                job.state = JobState::Failed {
                    error_msg,
                    failed_time: tpar_base::now_millis(),
                };
            }
        }
    }

    /// Kills a job if it is `Queued` or `Running`, transitioning it to
    /// `Killed` in the same locked region that observes its prior state —
    /// that's what makes this race-free against a worker's `ReportExit`
    /// arriving at the same moment: whichever transition takes the lock
    /// first wins, and the loser's transition is rejected by the
    /// `is_terminal`/`Running`-only guards above. Returns the prior state's
    /// cancellation token, if the job was `Running`, so the caller can
    /// signal the job's supervisor task to actually stop the child process.
    pub async fn kill(&self, id: JobId) -> Option<CancellationToken> {
        let mut inner = self.inner.lock().await;
        let job = inner.jobs.get_mut(&id)?;
        match &job.state {
            JobState::Queued { .. } => {
                job.state = JobState::Killed {
                    killed_time: tpar_base::now_millis(),
                };
                None
            }
            JobState::Running { cancel, .. } => {
                let cancel = cancel.clone();
                cancel.cancel();
                job.state = JobState::Killed {
                    killed_time: tpar_base::now_millis(),
                };
                Some(cancel)
            }
            _ => None,
        }
    }
}

fn pop_ready(
    inner: &mut Inner,
    worker_id: WorkerId,
) -> Option<(JobId, JobRequest, SinkKind, CancellationToken)> {
    while let Some(Reverse((_, id))) = inner.heap.pop() {
        let still_queued = inner
            .jobs
            .get(&id)
            .map(|j| matches!(j.state, JobState::Queued { .. }))
            .unwrap_or(false);
        if !still_queued {
            continue;
        }
        let job = inner.jobs.get_mut(&id).expect("checked above");
        job.state = JobState::running_now(worker_id);
        let cancel = match &job.state {
            JobState::Running { cancel, .. } => cancel.clone(),
            _ => unreachable!("just set to Running"),
        };
        return Some((id, job.request.clone(), job.sink.clone(), cancel));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use tpar_base::jid;

    fn req(priority: i32) -> JobRequest {
        let mut r = JobRequest::new("true");
        r.priority = Priority(priority);
        r
    }

    #[tokio::test]
    async fn ids_are_allocated_in_order() {
        let q = JobQueue::new();
        let a = q.enqueue(req(0), SinkKind::NoOutput).await;
        let b = q.enqueue(req(0), SinkKind::NoOutput).await;
        assert_eq!(a, jid![0]);
        assert_eq!(b, jid![1]);
    }

    #[tokio::test]
    async fn take_queued_respects_priority_then_submission_order() {
        let q = JobQueue::new();
        let low = q.enqueue(req(5), SinkKind::NoOutput).await;
        let high = q.enqueue(req(1), SinkKind::NoOutput).await;
        let also_high = q.enqueue(req(1), SinkKind::NoOutput).await;

        let (first, ..) = q.take_queued(WorkerId(0)).await;
        let (second, ..) = q.take_queued(WorkerId(0)).await;
        let (third, ..) = q.take_queued(WorkerId(0)).await;

        assert_eq!(first, high);
        assert_eq!(second, also_high);
        assert_eq!(third, low);
    }

    #[tokio::test]
    async fn take_queued_blocks_until_something_is_enqueued() {
        let q = std::sync::Arc::new(JobQueue::new());
        let q2 = q.clone();
        let handle = tokio::spawn(async move { q2.take_queued(WorkerId(0)).await });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        let id = q.enqueue(req(0), SinkKind::NoOutput).await;
        let (got, ..) = handle.await.unwrap();
        assert_eq!(got, id);
    }

    #[tokio::test]
    async fn killing_a_queued_job_removes_it_from_dispatch() {
        let q = JobQueue::new();
        let id = q.enqueue(req(0), SinkKind::NoOutput).await;
        assert!(q.kill(id).await.is_none());

        let job = q.get(id).await.unwrap();
        assert!(matches!(job.state, JobState::Killed { .. }));
    }

    #[tokio::test]
    async fn killing_a_running_job_returns_its_cancellation_token() {
        let q = JobQueue::new();
        let id = q.enqueue(req(0), SinkKind::NoOutput).await;
        q.take_queued(WorkerId(7)).await;

        let token = q.kill(id).await.expect("job was running");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn finishing_a_killed_job_is_a_no_op() {
        let q = JobQueue::new();
        let id = q.enqueue(req(0), SinkKind::NoOutput).await;
        q.take_queued(WorkerId(0)).await;
        q.kill(id).await;

        q.set_finished(id, tpar_base::ExitStatus::Exited(0)).await;

        let job = q.get(id).await.unwrap();
        assert!(matches!(job.state, JobState::Killed { .. }));
    }
}
