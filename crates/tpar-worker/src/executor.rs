//! Runs a single job: spawns the child, routes its output to whichever sink
//! the server resolved, watches for a kill, and reports back how it ended.
//! Shaped after the corpus's executor/child-session split — spawn, then
//! drive two output streams and a wait future concurrently — but built on
//! `tokio::process::Command` instead of a hand-rolled namespace/clone setup,
//! since process isolation itself is out of scope here.

use crate::conn::WorkerConn;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tpar_base::{ExitStatus, JobDescriptor, JobId, OutputChunk, SinkKind, StdStream, WorkerRequest};
use tracing::{info, warn};

const READ_CHUNK_SIZE: usize = 8192;

/// Runs `descriptor` to completion and reports its outcome to the server.
/// Never returns an error: every failure mode (spawn failure, a job killed
/// mid-run, the connection dropping) is reported over `conn` or logged, not
/// propagated, since there's no caller left to hand an error to once a job
/// has been accepted.
pub async fn run_job(descriptor: JobDescriptor, conn: Arc<WorkerConn>) {
    let JobDescriptor { id, request, sink } = descriptor;

    let mut command = Command::new(&request.command);
    command
        .args(&request.arguments)
        .current_dir(&request.working_directory)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(env) = &request.environment {
        command.env_clear();
        command.envs(env);
    }

    let mut child = match command.spawn() {
        Ok(child) => child,
        Err(err) => {
            warn!(job_id = %id, %err, "failed to spawn job");
            let _ = conn
                .call(WorkerRequest::ReportSpawnFailure(id, err.to_string()))
                .await;
            return;
        }
    };

    let cancel = CancellationToken::new();
    conn.watch_for_kill(id, cancel.clone()).await;

    let exit_status = drive_to_completion(id, &mut child, &sink, &conn, &cancel).await;

    conn.stop_watching(id).await;

    if let SinkKind::ToRemoteSink(stream_id) = sink {
        let _ = conn
            .call(WorkerRequest::PushDone(stream_id, exit_status.clone()))
            .await;
    }
    info!(job_id = %id, ?exit_status, "job finished");
    let _ = conn.call(WorkerRequest::ReportExit(id, exit_status)).await;
}

async fn drive_to_completion(
    id: JobId,
    child: &mut Child,
    sink: &SinkKind,
    conn: &Arc<WorkerConn>,
    cancel: &CancellationToken,
) -> ExitStatus {
    let stdout = child.stdout.take().expect("piped at spawn");
    let stderr = child.stderr.take().expect("piped at spawn");

    let stdout_task = tokio::spawn(pump(stdout, StdStream::Stdout, sink.clone(), conn.clone()));
    let stderr_task = tokio::spawn(pump(stderr, StdStream::Stderr, sink.clone(), conn.clone()));

    let wait_result = tokio::select! {
        result = child.wait() => result,
        _ = cancel.cancelled() => {
            signal_kill(&*child);
            child.wait().await
        }
    };

    let _ = stdout_task.await;
    let _ = stderr_task.await;

    match wait_result {
        Ok(status) => native_exit_status(status),
        Err(err) => {
            warn!(job_id = %id, %err, "failed to wait on child");
            ExitStatus::Signaled(0)
        }
    }
}

#[cfg(unix)]
fn signal_kill(child: &Child) {
    if let Some(pid) = child.id() {
        let pid = nix::unistd::Pid::from_raw(pid as i32);
        if let Err(err) = nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGTERM) {
            warn!(%err, "failed to send SIGTERM to job's child process");
        }
    }
}

#[cfg(not(unix))]
fn signal_kill(_child: &Child) {}

#[cfg(unix)]
fn native_exit_status(status: std::process::ExitStatus) -> ExitStatus {
    use std::os::unix::process::ExitStatusExt;
    match status.code() {
        Some(code) => ExitStatus::Exited(code),
        None => ExitStatus::Signaled(status.signal().unwrap_or(0)),
    }
}

#[cfg(not(unix))]
fn native_exit_status(status: std::process::ExitStatus) -> ExitStatus {
    ExitStatus::Exited(status.code().unwrap_or(-1))
}

async fn pump(
    mut reader: impl tokio::io::AsyncRead + Unpin,
    which: StdStream,
    sink: SinkKind,
    conn: Arc<WorkerConn>,
) {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) => {
                warn!(%err, "error reading job output");
                break;
            }
        };
        let chunk = OutputChunk {
            stream: which,
            data: buf[..n].to_vec(),
        };
        deliver(&sink, chunk, &conn).await;
    }
}

async fn deliver(sink: &SinkKind, chunk: OutputChunk, conn: &Arc<WorkerConn>) {
    match sink {
        SinkKind::NoOutput => {}
        SinkKind::ToFiles(stdout_path, stderr_path) => {
            let path = match chunk.stream {
                StdStream::Stdout => stdout_path,
                StdStream::Stderr => stderr_path,
            };
            if let Err(err) = append_to_file(path, &chunk.data).await {
                warn!(%err, path, "failed to write job output to file");
            }
        }
        SinkKind::ToRemoteSink(stream_id) => {
            let _ = conn
                .call(WorkerRequest::PushOutput(*stream_id, chunk))
                .await;
        }
    }
}

async fn append_to_file(path: impl AsRef<Path>, data: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path).await?;
    file.write_all(data).await
}
