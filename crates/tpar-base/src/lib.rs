//! Shared types for the tpar distributed task queue: job ids, requests,
//! the wire protocol's message shapes, and the job-match filter grammar.
//! Every other crate in this workspace depends on this one; it has no
//! dependencies on the rest of the workspace.

pub mod filter;
pub mod ids;
pub mod proto;
pub mod request;

pub use filter::{JobMatch, ParseError};
pub use ids::{JobId, Priority, StreamId, WorkerId};
pub use proto::{
    ClientRequest, ClientResponse, EnqueueRequest, EnqueueResponse, JobDescriptor, JobSnapshot,
    JobStateKind, JobStateView, SinkKind, SinkRequest, StreamEvent, WorkerRequest, WorkerResponse,
};
pub use request::{now_millis, ExitStatus, JobRequest, OutputChunk, StdStream};
