//! Job records.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::mask::{mask_text, mask_value};

/// Progress checkpoints reported while a job runs.
pub mod progress {
    /// Record created, nothing launched yet.
    pub const SUBMITTED: u8 = 0;
    /// Config artifact written, process about to start.
    pub const LAUNCHED: u8 = 25;
    /// Process returned or timed out.
    pub const RETURNED: u8 = 75;
    /// Terminal.
    pub const DONE: u8 = 100;
}

/// Job life-cycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    Timeout,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
            JobStatus::Error => "error",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status record of one module execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub module_id: String,
    pub status: JobStatus,
    pub progress: u8,
    pub start_time: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Path of the job's append-only log.
    pub log_ref: PathBuf,
}

impl JobRecord {
    pub fn new(id: impl Into<String>, module_id: impl Into<String>, log_ref: PathBuf) -> Self {
        Self {
            id: id.into(),
            module_id: module_id.into(),
            status: JobStatus::Running,
            progress: progress::SUBMITTED,
            start_time: Utc::now(),
            completed_time: None,
            output: None,
            error: None,
            log_ref,
        }
    }

    /// Raise progress. Progress never moves backwards and is frozen once
    /// the job is terminal.
    pub fn advance(&mut self, to: u8) {
        if self.status.is_terminal() {
            return;
        }
        self.progress = self.progress.max(to.min(progress::DONE));
    }

    /// Move to a terminal status. Later calls are ignored.
    pub fn finish(
        &mut self,
        status: JobStatus,
        output: Option<serde_json::Value>,
        error: Option<String>,
    ) {
        if self.status.is_terminal() || !status.is_terminal() {
            return;
        }
        self.status = status;
        self.progress = progress::DONE;
        self.completed_time = Some(Utc::now());
        self.output = output;
        self.error = error;
    }

    /// Copy safe to hand across the engine boundary.
    pub fn masked(&self) -> Self {
        Self {
            output: self.output.as_ref().map(mask_value),
            error: self.error.as_deref().map(mask_text),
            ..self.clone()
        }
    }
}

#[cfg(test)]
#[path = "job_tests.rs"]
mod tests;
