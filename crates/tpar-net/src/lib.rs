//! The framed wire protocol (spec.md §4.A) and a correlation-id based
//! request/reply primitive (spec.md §4.B) built on top of it. Neither module
//! knows anything about jobs or queues; both are generic over the message
//! types tpar-server and tpar-worker plug in.

pub mod codec;
pub mod connection;
pub mod rpc;

pub use codec::{FrameCodec, FrameError};
pub use connection::{split_framed, FrameReader, FrameWriter};
pub use rpc::{CallError, CorrelationId, Envelope, PendingCalls, PUSH_CORRELATION_ID};
