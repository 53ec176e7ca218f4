//! Helpers for turning a `TcpStream` into a pair of framed message streams.

use crate::codec::FrameCodec;
use serde::{de::DeserializeOwned, Serialize};
use tokio::net::TcpStream;
use tokio_util::codec::{FramedRead, FramedWrite};

/// The read half of a framed connection carrying messages of type `In`.
pub type FrameReader<In> = FramedRead<tokio::net::tcp::OwnedReadHalf, FrameCodec<In>>;
/// The write half of a framed connection carrying messages of type `Out`.
pub type FrameWriter<Out> = FramedWrite<tokio::net::tcp::OwnedWriteHalf, FrameCodec<Out>>;

/// Splits a connected `TcpStream` into independently pollable framed halves,
/// one for reading `In` messages and one for writing `Out` messages. This
/// mirrors how a stdio-exec transform wraps a child's pipes in `FramedRead`/
/// `FramedWrite`: the two directions never contend for the same lock.
pub fn split_framed<In, Out>(stream: TcpStream) -> (FrameReader<In>, FrameWriter<Out>)
where
    In: DeserializeOwned,
    Out: Serialize,
{
    let (read_half, write_half) = stream.into_split();
    (
        FramedRead::new(read_half, FrameCodec::new()),
        FramedWrite::new(write_half, FrameCodec::new()),
    )
}
