//! End-to-end scenarios driving a real server, a real worker, and real child
//! processes (`/bin/echo`, `/bin/sleep`) over actual TCP sockets — the same
//! style of test the corpus's worker crate uses against real shell
//! binaries, just one level up the stack.

use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tpar_base::{
    ClientRequest, ClientResponse, EnqueueRequest, JobMatch, JobRequest, JobStateKind, SinkRequest,
};
use tpar_net::{split_framed, FrameReader, FrameWriter};
use tpar_server::config::ServerConfig;
use tpar_worker::config::WorkerConfig;

async fn spawn_server() -> ServerConfig {
    let config = ServerConfig {
        host: "127.0.0.1".to_string(),
        client_port: 0,
        worker_port: 0,
        log_filter: "off".to_string(),
    };
    // Binding an ephemeral port (0) via `ServerConfig` directly isn't
    // possible since `tpar_server::run` binds both listeners itself; tests
    // instead pin fixed high ports per test to avoid needing that plumbing.
    config
}

async fn client_connect(port: u16) -> (FrameReader<ClientResponse>, FrameWriter<ClientRequest>) {
    let stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
    split_framed(stream)
}

async fn wait_for_port(port: u16) {
    for _ in 0..100 {
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("port {port} never came up");
}

async fn status_once(
    reader: &mut FrameReader<ClientResponse>,
    writer: &mut FrameWriter<ClientRequest>,
    filter: JobMatch,
) -> Vec<tpar_base::JobSnapshot> {
    writer.send(ClientRequest::Status(filter)).await.unwrap();
    match reader.next().await.unwrap().unwrap() {
        ClientResponse::Jobs(jobs) => jobs,
        other => panic!("expected Jobs, got {other:?}"),
    }
}

#[tokio::test]
async fn a_job_submitted_is_eventually_finished_by_a_worker() {
    let _ = spawn_server().await;
    let client_port = 17760;
    let worker_port = 17761;

    tokio::spawn(tpar_server::run(ServerConfig {
        host: "127.0.0.1".to_string(),
        client_port,
        worker_port,
        log_filter: "off".to_string(),
    }));
    wait_for_port(client_port).await;
    wait_for_port(worker_port).await;

    tokio::spawn(tpar_worker::run(WorkerConfig {
        server_host: "127.0.0.1".to_string(),
        server_port: worker_port,
        slots: 2,
        reconnect_interval_secs: None,
        log_filter: "off".to_string(),
    }));

    let (mut reader, mut writer) = client_connect(client_port).await;

    let mut request = JobRequest::new("/bin/echo");
    request.arguments = vec!["hello".to_string()];
    writer
        .send(ClientRequest::Enqueue(EnqueueRequest {
            request,
            sink: SinkRequest::NoOutput,
        }))
        .await
        .unwrap();
    let id = match reader.next().await.unwrap().unwrap() {
        ClientResponse::Enqueued(resp) => resp.id,
        other => panic!("expected Enqueued, got {other:?}"),
    };

    let finished = timeout(Duration::from_secs(5), async {
        loop {
            let jobs = status_once(&mut reader, &mut writer, JobMatch::Id(id)).await;
            if let Some(job) = jobs.into_iter().find(|j| j.id == id) {
                if job.state.is_terminal() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    })
    .await
    .expect("job did not finish in time");

    assert_eq!(finished.state.kind(), JobStateKind::Finished);
}

#[tokio::test]
async fn killing_a_running_job_marks_it_killed() {
    let client_port = 17762;
    let worker_port = 17763;

    tokio::spawn(tpar_server::run(ServerConfig {
        host: "127.0.0.1".to_string(),
        client_port,
        worker_port,
        log_filter: "off".to_string(),
    }));
    wait_for_port(client_port).await;
    wait_for_port(worker_port).await;

    tokio::spawn(tpar_worker::run(WorkerConfig {
        server_host: "127.0.0.1".to_string(),
        server_port: worker_port,
        slots: 2,
        reconnect_interval_secs: None,
        log_filter: "off".to_string(),
    }));

    let (mut reader, mut writer) = client_connect(client_port).await;

    let mut request = JobRequest::new("/bin/sleep");
    request.arguments = vec!["30".to_string()];
    writer
        .send(ClientRequest::Enqueue(EnqueueRequest {
            request,
            sink: SinkRequest::NoOutput,
        }))
        .await
        .unwrap();
    let id = match reader.next().await.unwrap().unwrap() {
        ClientResponse::Enqueued(resp) => resp.id,
        other => panic!("expected Enqueued, got {other:?}"),
    };

    timeout(Duration::from_secs(5), async {
        loop {
            let jobs = status_once(&mut reader, &mut writer, JobMatch::Id(id)).await;
            if jobs
                .iter()
                .any(|j| j.id == id && j.state.kind() == JobStateKind::Running)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(30)).await;
        }
    })
    .await
    .expect("job never started running");

    writer.send(ClientRequest::Kill(JobMatch::Id(id))).await.unwrap();
    let killed = match reader.next().await.unwrap().unwrap() {
        ClientResponse::Jobs(jobs) => jobs,
        other => panic!("expected Jobs, got {other:?}"),
    };
    assert_eq!(killed.len(), 1);
    assert_eq!(killed[0].state.kind(), JobStateKind::Killed);
}
