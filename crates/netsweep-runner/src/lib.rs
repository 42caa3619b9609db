//! # netsweep Runner
//!
//! Runs one module invocation as a separate, timed worker process and
//! tracks its [`JobRecord`](netsweep_protocols::JobRecord).
//!
//! ## Life cycle
//!
//! 1. [`JobRunner::submit`] resolves the module entrypoint and returns a
//!    job id immediately.
//! 2. A supervising task writes the job config file, spawns the process
//!    through a [`ProcessSandbox`](netsweep_protocols::ProcessSandbox) and
//!    records the verdict.
//! 3. The [`Reaper`] evicts finished records and deletes old logs.

mod artifact;
mod error;
mod log_sink;
mod reaper;
mod runner;
mod sandbox;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use artifact::ConfigArtifact;
pub use error::RunnerError;
pub use log_sink::LogSink;
pub use reaper::{ReapTask, Reaper};
pub use runner::{JobHandle, JobListing, JobRunner};
pub use sandbox::TokioSandbox;
