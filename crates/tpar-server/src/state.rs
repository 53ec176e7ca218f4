//! The server's shared, lock-protected state: the job queue and the
//! registry of live output streams. Every connection handler holds an
//! `Arc<ServerState>` and mutates it through its own async-safe methods;
//! there is no outer lock serializing handlers against each other the way
//! the upstream scheduler serializes every message through a single actor
//! loop, because here the job queue and the stream registry are already
//! each independently safe for concurrent access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tokio::sync::Mutex;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tpar_base::{ExitStatus, OutputChunk, StreamId, WorkerId};
use tpar_queue::JobQueue;
use tpar_subpub::{Event, Producer, SubPub};

pub type JobStream = SubPub<OutputChunk, ExitStatus>;
pub type JobStreamProducer = Producer<OutputChunk, ExitStatus>;
pub type JobStreamEvents = UnboundedReceiverStream<Event<OutputChunk, ExitStatus>>;

pub struct ServerState {
    pub queue: JobQueue,
    subpubs: Mutex<HashMap<StreamId, JobStream>>,
    producers: Mutex<HashMap<StreamId, JobStreamProducer>>,
    next_stream_id: AtomicU64,
    next_worker_id: AtomicU32,
}

impl Default for ServerState {
    fn default() -> Self {
        ServerState {
            queue: JobQueue::new(),
            subpubs: Mutex::new(HashMap::new()),
            producers: Mutex::new(HashMap::new()),
            next_stream_id: AtomicU64::new(0),
            next_worker_id: AtomicU32::new(0),
        }
    }
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh_worker_id(&self) -> WorkerId {
        WorkerId(self.next_worker_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Allocates a fresh stream, registering both halves so that a worker
    /// can push into it (by id, over the wire) while clients subscribe to
    /// it (also by id). Returns the id to hand to the job's sink.
    pub async fn open_stream(&self) -> StreamId {
        let id = StreamId(self.next_stream_id.fetch_add(1, Ordering::Relaxed));
        let (subpub, producer) = SubPub::from_producer();
        self.subpubs.lock().await.insert(id, subpub);
        self.producers.lock().await.insert(id, producer);
        id
    }

    pub async fn subscribe(&self, id: StreamId) -> Option<JobStreamEvents> {
        let subpub = self.subpubs.lock().await.get(&id).cloned()?;
        subpub.subscribe().await.ok()
    }

    pub async fn push_output(&self, id: StreamId, chunk: OutputChunk) {
        let producers = self.producers.lock().await;
        if let Some(producer) = producers.get(&id) {
            let _ = producer.push(chunk).await;
        }
    }

    pub async fn finish_stream_done(&self, id: StreamId, exit_status: ExitStatus) {
        let producer = self.producers.lock().await.remove(&id);
        self.subpubs.lock().await.remove(&id);
        if let Some(producer) = producer {
            producer.finish_done(exit_status).await;
        }
    }

    pub async fn finish_stream_failed(&self, id: StreamId, message: String) {
        let producer = self.producers.lock().await.remove(&id);
        self.subpubs.lock().await.remove(&id);
        if let Some(producer) = producer {
            producer.finish_failed(message).await;
        }
    }
}
