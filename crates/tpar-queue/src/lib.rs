//! The server's priority job queue: job records, lifecycle state, and the
//! queue that holds them (spec.md §3, §4.D).

pub mod job;
pub mod queue;

pub use job::{Job, JobState};
pub use queue::JobQueue;
