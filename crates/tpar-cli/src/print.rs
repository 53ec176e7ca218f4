//! Plain-text rendering of job snapshots for `status`/`kill`/`rerun`.

use tpar_base::{JobSnapshot, JobStateView, SinkKind};

pub fn print_jobs(jobs: &[JobSnapshot], verbose: bool) {
    if jobs.is_empty() {
        println!("no jobs matched");
        return;
    }
    for job in jobs {
        print_job(job, verbose);
    }
}

fn print_job(job: &JobSnapshot, verbose: bool) {
    println!(
        "{:>5}  {:<10}  {:<20}  {}",
        job.id,
        state_label(&job.state),
        job.request.name,
        job.request.command
    );
    if verbose {
        println!("         priority: {:?}", job.request.priority);
        println!("         args: {:?}", job.request.arguments);
        println!("         cwd: {}", job.request.working_directory);
        println!("         sink: {}", sink_label(&job.sink));
        if let Some(detail) = state_detail(&job.state) {
            println!("         {detail}");
        }
    }
}

fn state_label(state: &JobStateView) -> &'static str {
    match state {
        JobStateView::Queued { .. } => "queued",
        JobStateView::Running { .. } => "running",
        JobStateView::Finished { exit_status, .. } if exit_status.is_success() => "finished",
        JobStateView::Finished { .. } => "finished*",
        JobStateView::Failed { .. } => "failed",
        JobStateView::Killed { .. } => "killed",
    }
}

fn state_detail(state: &JobStateView) -> Option<String> {
    match state {
        JobStateView::Queued { queue_time } => Some(format!("queued at {queue_time}")),
        JobStateView::Running {
            worker_id,
            start_time,
        } => Some(format!("running on {worker_id} since {start_time}")),
        JobStateView::Finished {
            exit_status,
            finish_time,
        } => Some(format!("{exit_status:?} at {finish_time}")),
        JobStateView::Failed {
            error_msg,
            failed_time,
        } => Some(format!("{error_msg} at {failed_time}")),
        JobStateView::Killed { killed_time } => Some(format!("killed at {killed_time}")),
    }
}

fn sink_label(sink: &SinkKind) -> String {
    match sink {
        SinkKind::NoOutput => "discard".to_string(),
        SinkKind::ToFiles(stdout, stderr) => format!("files({stdout}, {stderr})"),
        SinkKind::ToRemoteSink(id) => format!("stream({id:?})"),
    }
}
