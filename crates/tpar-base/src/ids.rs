use serde::{Deserialize, Serialize};
use std::fmt;

/// A monotonically increasing id allocated by the server. Unique for the
/// lifetime of the server process.
#[derive(
    Copy, Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Scheduling priority. Smaller values are dispatched first (see spec.md
/// §4.D / §9): a job with priority 0 runs before a job with priority 5.
#[derive(
    Copy, Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct Priority(pub i32);

/// Identifies a connected worker for the lifetime of its connection.
#[derive(
    Copy, Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct WorkerId(pub u32);

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// A capability-style reference to a live SubPub stream. Handed out by the
/// server at enqueue time and carried, not dereferenced, by the worker that
/// feeds it and the clients that subscribe to it (see spec.md §9: "Cyclic
/// references").
#[derive(
    Copy, Clone, Debug, Default, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
pub struct StreamId(pub u64);

#[macro_export]
macro_rules! jid {
    [$n:expr] => { $crate::JobId($n) };
}

#[macro_export]
macro_rules! wid {
    [$n:expr] => { $crate::WorkerId($n) };
}

#[macro_export]
macro_rules! sid {
    [$n:expr] => { $crate::StreamId($n) };
}
