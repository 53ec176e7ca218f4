use crate::Priority;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// The immutable submission record for a job (spec.md §3).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct JobRequest {
    pub name: String,
    pub priority: Priority,
    pub command: String,
    pub arguments: Vec<String>,
    pub working_directory: String,
    /// Absent means "inherit the worker's environment".
    pub environment: Option<HashMap<String, String>>,
}

impl JobRequest {
    pub fn new(command: impl Into<String>) -> Self {
        JobRequest {
            name: "unnamed-job".to_string(),
            priority: Priority(0),
            command: command.into(),
            arguments: Vec::new(),
            working_directory: ".".to_string(),
            environment: None,
        }
    }
}

/// Which of a child's two output streams a chunk of bytes came from.
#[derive(Copy, Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum StdStream {
    Stdout,
    Stderr,
}

/// A chunk of a running child's output, tagged by origin stream. This is the
/// element type `A` fed into a job's SubPub when its sink is `ToRemoteSink`.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct OutputChunk {
    pub stream: StdStream,
    pub data: Vec<u8>,
}

/// How a child process terminated. Any exit code, including non-zero ones,
/// is a normal `Finished` job-state payload (spec.md §7): only a failure to
/// start or run the child at all is a `Failed` job.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(i32),
}

impl ExitStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }
}

/// Milliseconds since the Unix epoch, used for the timestamp fields carried
/// in `JobState`. Kept as a plain integer so job snapshots stay trivially
/// serializable across the wire.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before Unix epoch")
        .as_millis() as u64
}
