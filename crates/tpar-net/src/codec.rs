//! The wire framing used by every tpar connection (spec.md §4.A).
//!
//! Each frame on the wire is:
//!
//! ```text
//! magic:  u32 little-endian, always `MAGIC`
//! length: u32 little-endian, byte length of `payload`
//! payload: `length` bytes, a bincode-serialized `T`
//! ```
//!
//! The magic number exists purely to fail fast and loudly if a connection
//! somehow gets desynchronized (a stray byte, a protocol mismatch) instead of
//! silently trying to interpret garbage as a length and hanging on a read
//! that never completes.

use bytes::{Buf, BufMut, BytesMut};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use std::marker::PhantomData;
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

const MAGIC: u32 = 0xDEAD_BEEF;
const HEADER_LEN: usize = 8;

/// The largest payload this codec will accept before erroring out. Guards
/// against a corrupted or malicious length field causing an unbounded
/// allocation.
const MAX_FRAME_LEN: u32 = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("bad magic number {0:#010x}, expected {MAGIC:#010x}")]
    BadMagic(u32),
    #[error("frame length {0} exceeds maximum {MAX_FRAME_LEN}")]
    TooLarge(u32),
    #[error("failed to decode frame payload: {0}")]
    Decode(#[from] Box<bincode::ErrorKind>),
}

/// A `Decoder`/`Encoder` pair for a single message type `T`, framed with a
/// magic number and a length prefix and serialized with bincode.
pub struct FrameCodec<T> {
    _marker: PhantomData<T>,
}

impl<T> FrameCodec<T> {
    pub fn new() -> Self {
        FrameCodec {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for FrameCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Decoder for FrameCodec<T>
where
    T: DeserializeOwned,
{
    type Item = T;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<T>, FrameError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }
        let magic = u32::from_le_bytes(src[0..4].try_into().unwrap());
        if magic != MAGIC {
            return Err(FrameError::BadMagic(magic));
        }
        let len = u32::from_le_bytes(src[4..8].try_into().unwrap());
        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(len));
        }
        let total = HEADER_LEN + len as usize;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(HEADER_LEN);
        let payload = src.split_to(len as usize);
        let item = bincode::deserialize(&payload)?;
        Ok(Some(item))
    }
}

impl<T> Encoder<T> for FrameCodec<T>
where
    T: Serialize,
{
    type Error = FrameError;

    fn encode(&mut self, item: T, dst: &mut BytesMut) -> Result<(), FrameError> {
        let payload = bincode::serialize(&item)?;
        let len: u32 = payload
            .len()
            .try_into()
            .map_err(|_| FrameError::TooLarge(u32::MAX))?;
        if len > MAX_FRAME_LEN {
            return Err(FrameError::TooLarge(len));
        }
        dst.reserve(HEADER_LEN + payload.len());
        dst.put_u32_le(MAGIC);
        dst.put_u32_le(len);
        dst.put_slice(&payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq, Serialize)]
    struct Ping(u32, String);

    #[test]
    fn round_trips_a_single_frame() {
        let mut codec = FrameCodec::<Ping>::new();
        let mut buf = BytesMut::new();
        codec
            .encode(Ping(7, "hello".to_string()), &mut buf)
            .unwrap();
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, Ping(7, "hello".to_string()));
        assert!(buf.is_empty());
    }

    #[test]
    fn waits_for_more_data_on_partial_frame() {
        let mut codec = FrameCodec::<Ping>::new();
        let mut full = BytesMut::new();
        codec.encode(Ping(1, "x".to_string()), &mut full).unwrap();

        let mut partial = BytesMut::from(&full[..full.len() - 1]);
        assert!(codec.decode(&mut partial).unwrap().is_none());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut codec = FrameCodec::<Ping>::new();
        let mut buf = BytesMut::new();
        buf.put_u32_le(0x1234_5678);
        buf.put_u32_le(0);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(FrameError::BadMagic(0x1234_5678))
        ));
    }

    #[test]
    fn rejects_oversized_length() {
        let mut codec = FrameCodec::<Ping>::new();
        let mut buf = BytesMut::new();
        buf.put_u32_le(MAGIC);
        buf.put_u32_le(MAX_FRAME_LEN + 1);
        assert!(matches!(codec.decode(&mut buf), Err(FrameError::TooLarge(_))));
    }

    #[test]
    fn two_frames_back_to_back_decode_independently() {
        let mut codec = FrameCodec::<Ping>::new();
        let mut buf = BytesMut::new();
        codec.encode(Ping(1, "a".to_string()), &mut buf).unwrap();
        codec.encode(Ping(2, "b".to_string()), &mut buf).unwrap();

        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap(),
            Ping(1, "a".to_string())
        );
        assert_eq!(
            codec.decode(&mut buf).unwrap().unwrap(),
            Ping(2, "b".to_string())
        );
        assert!(buf.is_empty());
    }
}
